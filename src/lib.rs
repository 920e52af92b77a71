//! Veterinary case-consultation service.
//!
//! GPs submit patient cases; board-certified specialists claim them and
//! respond in a two-phase workflow (diagnostic plan, then treatment
//! report). The service owns the case state machine, the merged
//! message/file timeline, and zip-on-demand file bundling; identity and
//! payment live with external collaborators behind narrow seams.

pub mod api;
pub mod bundle;
pub mod config;
pub mod db;
pub mod lifecycle;
pub mod models;
pub mod notify;
pub mod payment;
pub mod storage;
pub mod timeline;
