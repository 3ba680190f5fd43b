//! sift: a discovery-based test harness core.
//!
//! The pipeline: the [`select`] layer decides what looks like a test, the
//! [`import`] layer materializes modules through the embedder's
//! [`import::ModuleSource`], the [`load`] layer turns modules into a lazy
//! [`suite::Suite`] tree, and the [`run`] layer executes it — serially or
//! across a worker pool — reporting through [`result`] with [`plugin`]
//! hooks at every stage.

use std::sync::Once;

pub mod case;
pub mod commands;
pub mod config;
pub mod import;
pub mod load;
pub mod plugin;
pub mod result;
pub mod run;
pub mod select;
pub mod suite;
pub mod testing;

pub use sift_model as model;

static TRACING_INIT: Once = Once::new();

/// Initialize tracing output, gated on `RUST_LOG`.
///
/// Does nothing unless `RUST_LOG` is set; safe to call more than once.
pub fn init_tracing() {
    if std::env::var("RUST_LOG").is_err() {
        return;
    }
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
        tracing_subscriber::registry()
            .with(tracing_subscriber::EnvFilter::from_default_env())
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    });
}
