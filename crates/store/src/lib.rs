//! Record store adapters.
//!
//! Implements the [`relay::RecordStore`] and [`relay::RecordReader`] ports.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** The relay only ever writes records; reading is offered
//! for verification (the admin surface and tests).
//!
//! | Store | Backing | Durability |
//! |-------|---------|------------|
//! | [`InMemoryRecordStore`] | `HashMap` behind a `RwLock` | process lifetime |
//! | [`FileRecordStore`] | one JSON document per record | survives restarts |

mod file;
mod memory;

pub use file::FileRecordStore;
pub use memory::InMemoryRecordStore;
