use crate::error::{Error, Result};
use crate::layouts::{AVB_HEADER_SIZE, AvbVBMetaHeader};
use crate::parser::BootImage;
use crate::utils::SliceExt;
use rsa::{BigUint, Pkcs1v15Sign, RsaPublicKey};
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha512};
use tracing::{debug, warn};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum DigestAlgorithm {
    Sha1,
    Sha256,
    Sha512,
}

impl DigestAlgorithm {
    pub fn digest_len(self) -> usize {
        match self {
            Self::Sha1 => 20,
            Self::Sha256 => 32,
            Self::Sha512 => 64,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AlgorithmType {
    None,
    Sha256Rsa2048,
    Sha256Rsa4096,
    Sha256Rsa8192,
    Sha512Rsa2048,
    Sha512Rsa4096,
    Sha512Rsa8192,
    Unknown(u32),
}

impl AlgorithmType {
    pub fn from_raw(value: u32) -> Self {
        match value {
            0 => Self::None,
            1 => Self::Sha256Rsa2048,
            2 => Self::Sha256Rsa4096,
            3 => Self::Sha256Rsa8192,
            4 => Self::Sha512Rsa2048,
            5 => Self::Sha512Rsa4096,
            6 => Self::Sha512Rsa8192,
            v => Self::Unknown(v),
        }
    }

    pub fn digest_algorithm(self) -> Option<DigestAlgorithm> {
        match self {
            Self::Sha256Rsa2048 | Self::Sha256Rsa4096 | Self::Sha256Rsa8192 => {
                Some(DigestAlgorithm::Sha256)
            }
            Self::Sha512Rsa2048 | Self::Sha512Rsa4096 | Self::Sha512Rsa8192 => {
                Some(DigestAlgorithm::Sha512)
            }
            Self::None | Self::Unknown(_) => None,
        }
    }
}

/// Hashing and signature primitives used by verification and by header
/// checksum maintenance.
pub trait Crypto {
    fn digest(&self, algorithm: DigestAlgorithm, parts: &[&[u8]]) -> Vec<u8>;

    /// Check a PKCS#1 v1.5 signature over `digest`. `public_key` is in the
    /// AVB binary key format.
    fn verify_signature(
        &self,
        algorithm: DigestAlgorithm,
        digest: &[u8],
        signature: &[u8],
        public_key: &[u8],
    ) -> bool;

    fn sha256(&self, data: &[u8]) -> [u8; 32] {
        let mut out = [0u8; 32];
        let digest = self.digest(DigestAlgorithm::Sha256, &[data]);
        let len = digest.len().min(out.len());
        out[..len].copy_from_slice(&digest[..len]);
        out
    }
}

/// [`Crypto`] backed by the RustCrypto crates.
#[derive(Debug, Default, Clone, Copy)]
pub struct RustCrypto;

fn digest_parts<D: Digest>(parts: &[&[u8]]) -> Vec<u8> {
    let mut hasher = D::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().to_vec()
}

/// Decode a public key from the AVB binary format: the key size in bits and
/// `n0inv` as big-endian u32s, then the modulus.
pub fn decode_public_key(data: &[u8]) -> Option<RsaPublicKey> {
    let key_bits = data.u32_be_at(0)? as usize;
    let modulus_raw = data.get(8..8usize.checked_add(key_bits / 8)?)?;
    let modulus = BigUint::from_bytes_be(modulus_raw);
    RsaPublicKey::new(modulus, BigUint::from(65537u32)).ok()
}

impl Crypto for RustCrypto {
    fn digest(&self, algorithm: DigestAlgorithm, parts: &[&[u8]]) -> Vec<u8> {
        match algorithm {
            DigestAlgorithm::Sha1 => digest_parts::<Sha1>(parts),
            DigestAlgorithm::Sha256 => digest_parts::<Sha256>(parts),
            DigestAlgorithm::Sha512 => digest_parts::<Sha512>(parts),
        }
    }

    fn verify_signature(
        &self,
        algorithm: DigestAlgorithm,
        digest: &[u8],
        signature: &[u8],
        public_key: &[u8],
    ) -> bool {
        let Some(key) = decode_public_key(public_key) else {
            warn!("Failed to decode AVB public key");
            return false;
        };
        let scheme = match algorithm {
            DigestAlgorithm::Sha1 => Pkcs1v15Sign::new::<Sha1>(),
            DigestAlgorithm::Sha256 => Pkcs1v15Sign::new::<Sha256>(),
            DigestAlgorithm::Sha512 => Pkcs1v15Sign::new::<Sha512>(),
        };
        key.verify(scheme, digest, signature).is_ok()
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum AvbKind {
    /// vbmeta right after the boot image sections, no footer.
    Avb1,
    /// vbmeta located through the footer at the end of the partition.
    Avb2,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Check {
    Passed,
    Failed,
    /// Nothing to check, e.g. algorithm `NONE`.
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvbReport {
    pub kind: AvbKind,
    pub vbmeta_offset: u64,
    pub vbmeta_size: u64,
    pub algorithm: AlgorithmType,
    pub rollback_index: u64,
    pub hash: Check,
    pub signature: Check,
}

impl AvbReport {
    pub fn is_verified(&self) -> bool {
        self.hash != Check::Failed && self.signature != Check::Failed
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyOutcome {
    /// No AVB structures in the image.
    Unsigned,
    /// An AVB footer or vbmeta block was found at a valid location.
    Signed(AvbReport),
}

struct VbmetaBlocks<'a> {
    header: &'a [u8],
    auth: &'a [u8],
    aux: &'a [u8],
}

fn split_vbmeta<'a>(vbmeta: &'a [u8], hdr: &AvbVBMetaHeader<'_>) -> Option<VbmetaBlocks<'a>> {
    let auth_size = usize::try_from(hdr.get_authentication_data_block_size()).ok()?;
    let aux_size = usize::try_from(hdr.get_auxiliary_data_block_size()).ok()?;
    let auth_end = AVB_HEADER_SIZE.checked_add(auth_size)?;
    let aux_end = auth_end.checked_add(aux_size)?;
    Some(VbmetaBlocks {
        header: vbmeta.get(..AVB_HEADER_SIZE)?,
        auth: vbmeta.get(AVB_HEADER_SIZE..auth_end)?,
        aux: vbmeta.get(auth_end..aux_end)?,
    })
}

fn sub_block(block: &[u8], offset: u64, size: u64) -> Option<&[u8]> {
    let offset = usize::try_from(offset).ok()?;
    let size = usize::try_from(size).ok()?;
    block.get(offset..offset.checked_add(size)?)
}

/// Check the AVB structures of a parsed image. The vbmeta digest covers the
/// vbmeta header and auxiliary block; on AVB1 images the boot image bytes in
/// front of the vbmeta block are hashed first. When `public_key` is `None`
/// the key embedded in the auxiliary block is used.
pub fn verify(
    image: &BootImage<'_>,
    public_key: Option<&[u8]>,
    crypto: &dyn Crypto,
) -> Result<VerifyOutcome> {
    let Some(avb) = image.avb() else {
        return Ok(VerifyOutcome::Unsigned);
    };
    let data = image.data();

    let (kind, vbmeta_offset, vbmeta_size) = match avb.footer() {
        Some(footer) => {
            let vbmeta_offset = footer.get_vbmeta_offset();
            let vbmeta_size = footer.get_vbmeta_size();
            let original_image_size = footer.get_original_image_size();
            let invalid = Error::AvbFooterInvalid {
                vbmeta_offset,
                vbmeta_size,
                original_image_size,
            };
            let in_bounds = vbmeta_offset
                .checked_add(vbmeta_size)
                .is_some_and(|end| end <= original_image_size)
                && avb
                    .footer_offset()
                    .is_some_and(|off| original_image_size <= off as u64);
            if !in_bounds {
                return Err(invalid);
            }
            (AvbKind::Avb2, vbmeta_offset, vbmeta_size)
        }
        None => (AvbKind::Avb1, avb.vbmeta_offset() as u64, avb.vbmeta_size()),
    };
    debug!("{kind:?} vbmeta at 0x{vbmeta_offset:x} size {vbmeta_size}");

    let Some(hdr) = avb.vbmeta_header() else {
        warn!("no vbmeta header at 0x{vbmeta_offset:x}");
        return Ok(VerifyOutcome::Signed(AvbReport {
            kind,
            vbmeta_offset,
            vbmeta_size,
            algorithm: AlgorithmType::None,
            rollback_index: 0,
            hash: Check::Failed,
            signature: Check::Failed,
        }));
    };
    let algorithm = AlgorithmType::from_raw(hdr.get_algorithm_type());
    let mut report = AvbReport {
        kind,
        vbmeta_offset,
        vbmeta_size,
        algorithm,
        rollback_index: hdr.get_rollback_index(),
        hash: Check::Skipped,
        signature: Check::Skipped,
    };

    let Some(digest_algorithm) = algorithm.digest_algorithm() else {
        if algorithm != AlgorithmType::None {
            warn!("Unsupported AVB algorithm {:?}", algorithm);
            report.hash = Check::Failed;
            report.signature = Check::Failed;
        }
        return Ok(VerifyOutcome::Signed(report));
    };

    let vbmeta = sub_block(data, vbmeta_offset, vbmeta_size);
    let Some(blocks) = vbmeta.and_then(|v| split_vbmeta(v, &hdr)) else {
        warn!("vbmeta blocks exceed the vbmeta image");
        report.hash = Check::Failed;
        report.signature = Check::Failed;
        return Ok(VerifyOutcome::Signed(report));
    };

    let signed_prefix: &[u8] = match kind {
        AvbKind::Avb1 => &data[..avb.vbmeta_offset()],
        AvbKind::Avb2 => &[],
    };
    let digest = crypto.digest(
        digest_algorithm,
        &[signed_prefix, blocks.header, blocks.aux],
    );

    let expected = sub_block(blocks.auth, hdr.get_hash_offset(), hdr.get_hash_size());
    report.hash = match expected {
        Some(expected) if expected == digest.as_slice() => Check::Passed,
        _ => Check::Failed,
    };

    let embedded_key = sub_block(blocks.aux, hdr.get_public_key_offset(), hdr.get_public_key_size());
    let signature = sub_block(blocks.auth, hdr.get_signature_offset(), hdr.get_signature_size());
    report.signature = match (public_key.or(embedded_key), signature) {
        (Some(key), Some(signature)) if !signature.is_empty() => {
            if crypto.verify_signature(digest_algorithm, &digest, signature, key) {
                Check::Passed
            } else {
                Check::Failed
            }
        }
        _ => Check::Failed,
    };

    Ok(VerifyOutcome::Signed(report))
}
