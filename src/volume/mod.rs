//! Multi-volume archive support.
//!
//! A RAR archive may be split into several files. Each volume is a complete
//! archive file of its own (signature, main header, blocks, end header);
//! entries whose data does not fit are continued in the next volume with
//! split flags on their headers.
//!
//! This module opens single volumes ([`VolumeReader`]), computes the names
//! of following volumes ([`next_volume_path`]) and locates them with help
//! from the caller ([`VolumeResolver`]).

mod naming;
mod reader;
mod resolver;

pub use naming::{is_new_numbering, next_volume_path};
pub use reader::VolumeReader;
pub use resolver::VolumeResolver;
