// Dubbing API HTTP handlers
//
// The interface between HTTP requests and the run manager.

pub mod authentication;
pub mod routes;

// Re-export handlers for easier access
pub use self::routes::{
    api_status, cancel_dubbing, dubbing_options, dubbing_result, dubbing_status, metrics_handler,
    submit_dubbing,
};
// Re-export authentication middleware
pub use self::authentication::Authentication;
