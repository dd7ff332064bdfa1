//! Implementation for the encrypted portion of an INTRODUCE message.
//!
//! TODO HS: maybe rename this module.
//!
//! TODO HS: Maybe this doesn't belong in tor-cell.

use super::ext::{decl_extension_group, ExtGroup, ExtList, UnrecognizedExt};
use caret::caret_int;
use tor_bytes::{EncodeError, EncodeResult, Error, Readable, Reader, Result, Writeable, Writer};
use tor_hscrypto::RendCookie;

/// A single, unparsed link specifier, as found in an extend cell or an
/// [`IntroduceHandshakePayload`].
///
/// A link specifier tells a client how to find a relay: by address, by
/// identity key, or (for types this crate doesn't recognize) by some other
/// means it doesn't try to interpret.
///
/// ```text
///      LSTYPE (Link specifier type)   [1 byte]
///      LSLEN  (Link specifier length) [1 byte]
///      LSPEC  (Link specifier)        [LSLEN bytes]
/// ```
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LinkSpecifier {
    /// The type of this link specifier.
    ls_type: u8,
    /// The raw body of this link specifier.
    body: Vec<u8>,
}

impl LinkSpecifier {
    /// Construct a new link specifier from a type and a body.
    pub fn new(ls_type: u8, body: impl Into<Vec<u8>>) -> Self {
        Self {
            ls_type,
            body: body.into(),
        }
    }

    /// Return the type of this link specifier.
    pub fn ls_type(&self) -> u8 {
        self.ls_type
    }

    /// Return the raw body of this link specifier.
    pub fn body(&self) -> &[u8] {
        &self.body
    }
}

impl Readable for LinkSpecifier {
    fn take_from(r: &mut Reader<'_>) -> Result<Self> {
        let ls_type = r.take_u8()?;
        let body = r.read_nested_u8len(|r| Ok(r.take_rest().into()))?;
        Ok(Self { ls_type, body })
    }
}

impl Writeable for LinkSpecifier {
    fn write_onto<B: Writer + ?Sized>(&self, w: &mut B) -> EncodeResult<()> {
        w.write_u8(self.ls_type);
        let mut nested = w.write_nested_u8len();
        nested.write_all(&self.body[..]);
        nested.finish()?;
        Ok(())
    }
}

caret_int! {
    /// Type code for an extension in an [`IntroduceHandshakePayload`].
    #[derive(Ord,PartialOrd)]
    pub struct IntroPayloadExtType(u8) {
    }
}

decl_extension_group! {
    /// An extension to an [`IntroduceHandshakePayload`].
    ///
    /// (Currently, no extensions of this type are recognized)
    #[derive(Debug,Clone)]
    enum IntroPayloadExt [ IntroPayloadExtType ] {
    }
}

caret_int! {
    /// An enumeration value to identify a type of onion key.
    struct OnionKeyType(u8) {
        NTOR = 0x01,
    }
}

/// An onion key provided in an IntroduceHandshakePayload.
///
/// TODO HS: Is there a logical type somewhere else to coalesce this with?
#[derive(Clone, Debug)]
#[non_exhaustive]
pub enum OnionKey {
    /// A key usable with the ntor or ntor-v3 handshake.
    NtorOnionKey(tor_llcrypto::pk::curve25519::PublicKey),
    // There is no "unknown" variant for this type, since we don't support any
    // other key types yet.
}

impl Readable for OnionKey {
    fn take_from(r: &mut Reader<'_>) -> Result<Self> {
        let kind: OnionKeyType = r.take_u8()?.into();
        r.read_nested_u16len(|r_inner| match kind {
            OnionKeyType::NTOR => Ok(OnionKey::NtorOnionKey(r_inner.extract()?)),
            _ => Err(Error::InvalidMessage(
                format!("Unrecognized onion key type {kind}").into(),
            )),
        })
    }
}

impl Writeable for OnionKey {
    fn write_onto<B: Writer + ?Sized>(&self, w: &mut B) -> EncodeResult<()> {
        match self {
            OnionKey::NtorOnionKey(key) => {
                w.write_u8(OnionKeyType::NTOR.into());
                let mut w_inner = w.write_nested_u16len();
                w_inner.write(key)?;
                w_inner.finish()?;
            }
        }
        Ok(())
    }
}

/// The plaintext of the encrypted portion of an INTRODUCE message.
///
/// This is not a RelayMsg itself; it is instead used as the payload for an
/// `hs-ntor` handshake, which is passed to the onion service in `Introduce[12]`
/// message.
///
/// This payload is sent from a client to the onion service to tell it how to reach
/// the client's chosen rendezvous point.
#[derive(Clone, Debug)]
pub struct IntroduceHandshakePayload {
    /// The rendezvous cookie to use at the rendezvous point.
    cookie: RendCookie,
    /// A list of extensions to this payload
    extensions: ExtList<IntroPayloadExt>,
    /// The onion key to use when extending a circuit to the rendezvous point.
    onion_key: OnionKey,
    /// A list of link specifiers to identify the rendezvous point.
    link_specifiers: Vec<LinkSpecifier>,
}

impl Readable for IntroduceHandshakePayload {
    fn take_from(r: &mut Reader<'_>) -> Result<Self> {
        let cookie = r.extract()?;
        let extensions = r.extract()?;
        let onion_key = r.extract()?;
        let n_link_specifiers = r.take_u8()?;
        let link_specifiers = r.extract_n(n_link_specifiers.into())?;
        Ok(Self {
            cookie,
            extensions,
            onion_key,
            link_specifiers,
        })
    }
}

impl Writeable for IntroduceHandshakePayload {
    fn write_onto<B: Writer + ?Sized>(&self, w: &mut B) -> EncodeResult<()> {
        w.write(&self.cookie)?;
        w.write(&self.extensions)?;
        w.write(&self.onion_key)?;
        w.write_u8(
            self.link_specifiers
                .len()
                .try_into()
                .map_err(|_| EncodeError::BadLengthValue)?,
        );
        self.link_specifiers.iter().try_for_each(|ls| w.write(ls))?;

        Ok(())
    }
}

impl IntroduceHandshakePayload {
    /// Construct a new [`IntroduceHandshakePayload`]
    pub fn new(
        cookie: RendCookie,
        onion_key: OnionKey,
        link_specifiers: Vec<LinkSpecifier>,
    ) -> Self {
        let extensions = ExtList::default();
        Self {
            cookie,
            extensions,
            onion_key,
            link_specifiers,
        }
    }
}

#[cfg(test)]
mod test {
    // @@ begin test lint list maintained by maint/add_warning @@
    #![allow(clippy::bool_assert_comparison)]
    #![allow(clippy::clone_on_copy)]
    #![allow(clippy::dbg_macro)]
    #![allow(clippy::print_stderr)]
    #![allow(clippy::print_stdout)]
    #![allow(clippy::single_char_pattern)]
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::unchecked_duration_subtraction)]
    #![allow(clippy::useless_vec)]
    #![allow(clippy::needless_pass_by_value)]
    //! <!-- @@ end test lint list maintained by maint/add_warning @@ -->
    use super::*;
    use tor_bytes::Writer as _;

    #[test]
    fn roundtrip() {
        let cookie = RendCookie::from([7; 20]);
        let onion_key = OnionKey::NtorOnionKey([9; 32].into());
        let link_specifiers = vec![
            LinkSpecifier::new(0, vec![1, 2, 3, 4]),
            LinkSpecifier::new(2, vec![0xaa; 20]),
        ];
        let payload = IntroduceHandshakePayload::new(cookie, onion_key, link_specifiers.clone());

        let mut encoded = Vec::new();
        encoded.write(&payload).unwrap();

        let mut r = Reader::from_slice(&encoded);
        let decoded: IntroduceHandshakePayload = r.extract().unwrap();
        assert_eq!(decoded.link_specifiers, link_specifiers);
    }
}
