//! Record and replay of pipeline object creation
//!
//! A [`ResourceRecord`] turns the sequence of objects built by a cache into a
//! compact binary log; a [`ResourceReplay`] rebuilds an equivalent object graph
//! from such a log.

pub mod codec;
pub mod resource_record;
pub mod resource_replay;
pub mod resource_type;

pub use codec::{Decode, Encode, LogReader, LogWriter};
pub use resource_record::ResourceRecord;
pub use resource_replay::{ReplayReport, ResourceReplay, UnsupportedRecord};
pub use resource_type::{GraphicsPipelineRecord, Record, ResourceType};
