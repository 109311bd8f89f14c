//! Checksum trait and implementations for payload digests.

/// Width of the digest stored after every non-empty payload.
pub const CHECKSUM_LEN: usize = 16;

/// An incremental digest producing the 16-byte value stored in an archive.
///
/// Writer and reader must agree on the algorithm; nothing on the wire says
/// which one was used.
pub trait Checksum: Default + Send + Unpin {
    /// Human-readable algorithm name.
    const NAME: &'static str;

    fn update(&mut self, data: &[u8]);

    fn finalize(self) -> [u8; CHECKSUM_LEN];
}

/// The digest archives are written with unless a caller picks another one.
pub type DefaultChecksum = md5::Md5;

impl Checksum for md5::Md5 {
    const NAME: &'static str = "md5";

    fn update(&mut self, data: &[u8]) {
        digest::Digest::update(self, data);
    }

    fn finalize(self) -> [u8; CHECKSUM_LEN] {
        let out = digest::Digest::finalize(self);
        let mut buf = [0u8; CHECKSUM_LEN];
        buf.copy_from_slice(&out);
        buf
    }
}

/// BLAKE3 with its extendable output cut to 16 bytes.
impl Checksum for blake3::Hasher {
    const NAME: &'static str = "blake3";

    fn update(&mut self, data: &[u8]) {
        blake3::Hasher::update(self, data);
    }

    fn finalize(self) -> [u8; CHECKSUM_LEN] {
        let mut buf = [0u8; CHECKSUM_LEN];
        self.finalize_xof().fill(&mut buf);
        buf
    }
}
