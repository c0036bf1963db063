//! Publishing and reading segmented content
//!
//! ```text
//! Writer::put ──> protection key ──> Segmenter ──> FlowControl ──> store
//!                 (ACL lookup)       encrypt,      bounded,
//!                                    sign, split   acknowledged
//!
//! Reader::open <── decrypt <── node key <── verify <── fetch segments
//! ```

mod error;
mod flow_control;
mod reader;
mod segmenter;
mod writer;

pub use error::IoError;
pub use flow_control::FlowControl;
pub use reader::{ContentStream, Reader};
pub use segmenter::{SegmentOptions, Segmenter};
pub use writer::{NewVersionOptions, PutOptions, Writer};
