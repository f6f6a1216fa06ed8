//! Application state for the bridge API

use std::sync::Arc;

use mbridge_correlate::DeviceController;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    controller: Arc<DeviceController>,
}

impl AppState {
    pub fn new(controller: Arc<DeviceController>) -> Self {
        Self { controller }
    }

    pub fn controller(&self) -> &DeviceController {
        &self.controller
    }
}
