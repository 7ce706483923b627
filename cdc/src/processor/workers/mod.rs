//! The long running loops of a processor.
//!
//! ```text
//! table pullers ──► table buffers ──(global resolved ts)──► entries ──► sync resolved ──► sink
//!                                                                            │
//!  ddl puller ──────────────────────────────────────────────► ddl jobs ──────┘
//!                                                                            │ resolved barriers
//!                                                                            ▼
//!                                                        local resolved ──► coordination store
//! ```

pub mod global_resolved;
pub mod local_resolved;
pub mod sync_resolved;
