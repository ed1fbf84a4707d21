use crate::storage::SqliteStore;

#[derive(Clone)]
pub struct AppState {
    pub store: SqliteStore,
}
