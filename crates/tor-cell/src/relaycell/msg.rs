//! Encoding and decoding for the bodies of relay cell messages.
//!
//! This module only defines the [`Body`] trait that message bodies implement,
//! and the [`empty_body!`] helper macro for the (several) HS messages that
//! carry no payload at all. The actual HS message bodies live under
//! [`crate::relaycell::hs`].

use tor_bytes::{EncodeResult, Reader, Result, Writer};

/// A trait for the bodies of relay cell messages.
///
/// A `Body` is what's found inside a relay cell after the command and any
/// fixed header fields: it knows how to parse itself from the remaining
/// bytes of the cell, and how to serialize itself back onto a cell body.
pub trait Body: Sized {
    /// Decode a relay cell body from a provided reader.
    fn decode_from_reader(r: &mut Reader<'_>) -> Result<Self>;
    /// Encode a relay cell body onto a provided writer.
    fn encode_onto<W: Writer + ?Sized>(self, w: &mut W) -> EncodeResult<()>;
}

/// Declare a message type that takes no arguments, and carries no body.
macro_rules! empty_body {
    {
        $(#[$meta:meta])*
        pub struct $name:ident {}
    } => {
        $(#[$meta])*
        #[derive(Clone,Debug,Default)]
        #[non_exhaustive]
        pub struct $name {}
        impl $crate::relaycell::msg::Body for $name {
            fn decode_from_reader(_r: &mut Reader<'_>) -> Result<Self> {
                Ok(Self::default())
            }
            fn encode_onto<W: Writer + ?Sized>(self, _w: &mut W) -> EncodeResult<()> {
                Ok(())
            }
        }
    }
}
pub(crate) use empty_body;
