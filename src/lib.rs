//! Binary to XML property list conversion.
//!
//! [`Plist::from_binary`] decodes a `bplist00` buffer into a [`Plist`] tree and
//! [`Plist::write_xml`] renders that tree as an XML property list. The
//! [`convert_file`] family ties both to the filesystem.

pub mod convert;
pub mod error;
pub mod plist;
pub mod stream;

pub use convert::{convert_bytes, convert_file, convert_file_to};
pub use error::Error;
pub use plist::Plist;
