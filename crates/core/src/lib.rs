//! Core types for bustrace
//!
//! This crate defines the data model shared by every layer:
//! - [`CausalityHeader`]: propagated identity (id, parents, label)
//! - [`Headers`], [`Payload`], [`MessageSnapshot`]: message model
//! - [`CaptureEvent`], [`Direction`]: what an interceptor hands off
//! - [`TraceRecord`]: persisted form, plus the partition layout
//! - [`TraceError`], [`MalformedHeaderError`]: error taxonomy

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod causality;
pub mod error;
pub mod event;
pub mod message;
pub mod record;

pub use causality::{CausalityHeader, MessageId, MESSAGE_ID_LEN, TRACE_HEADER};
pub use error::{MalformedHeaderError, Result, TraceError};
pub use event::{now_millis, CaptureEvent, Direction};
pub use message::{Headers, MessageSnapshot, Payload};
pub use record::{RecordLocator, TraceRecord, CORRELATION_PARTITION, RECORDS_PARTITION};
