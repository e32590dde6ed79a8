//! Xtream Codes Integration
//!
//! Client for the Xtream Codes Player API v2, limited to what a guide
//! update needs: account check, live categories, live streams and the
//! XMLTV programme count.
//!
//! ```text
//! http://server:port/player_api.php?username=X&password=Y[&action=...]
//! http://server:port/xmltv.php?username=X&password=Y
//! ```

pub mod client;
pub mod types;

// Re-exports for convenience
pub use client::{XtreamClient, XtreamError};
