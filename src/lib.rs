pub mod backend;
pub mod error;
pub mod profiles;
pub mod records;
pub mod rooms;
pub mod session;

use std::sync::Arc;

use serde_json::Value;

pub use error::{AppResult, Error};

/// Handles to the four hosted collaborators. Constructed once at process
/// start and passed by clone to everything that needs them; there is no
/// ambient global.
#[derive(Clone)]
pub struct Backend {
    pub auth: Arc<dyn backend::AuthApi>,
    pub store: Arc<dyn backend::Store>,
    pub realtime: Arc<dyn backend::Realtime>,
    pub blobs: Arc<dyn backend::BlobStorage>,
}

pub trait GetField {
    fn get_str_field(&self, field: &str) -> Option<&str>;
}

impl GetField for Value {
    fn get_str_field(&self, field: &str) -> Option<&str> {
        self.get(field).and_then(Value::as_str)
    }
}
