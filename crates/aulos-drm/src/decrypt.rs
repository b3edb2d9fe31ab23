//! AES-128-CTR chunk decryption.

use aes::Aes128;
use ctr::cipher::{KeyIvInit, StreamCipher};
use tracing::trace;

use aulos_core::CHUNK_SIZE;

use crate::{DecryptContext, DrmError, DrmResult};

type Aes128Ctr = ctr::Ctr128BE<Aes128>;

/// AES block size in bytes.
const AES_BLOCK_SIZE: usize = 16;

/// Fixed initial counter value shared by every audio file.
const AUDIO_IV: [u8; 16] = [
    0x72, 0xe0, 0x67, 0xfb, 0xdd, 0xcb, 0xcf, 0x77, 0xeb, 0xe8, 0xbc, 0x64, 0x3f, 0x63, 0x0d,
    0x93,
];

/// Decrypt one chunk of ciphertext into `output`.
///
/// The CTR counter for chunk `index` starts at the fixed IV advanced by
/// `index * CHUNK_SIZE / 16` AES blocks, so chunks decrypt independently
/// of one another. `input` and `output` must be the same length; a
/// mismatch is a caller bug and fails with [`DrmError::InvalidChunkSize`].
pub fn decrypt_chunk(
    ctx: &DecryptContext,
    index: usize,
    input: &[u8],
    output: &mut [u8],
) -> DrmResult<()> {
    if input.len() != output.len() {
        return Err(DrmError::InvalidChunkSize {
            expected: output.len(),
            got: input.len(),
        });
    }

    if input.is_empty() {
        return Ok(());
    }

    let iv = chunk_iv(index);
    let mut cipher = Aes128Ctr::new(ctx.key().into(), (&iv).into());

    output.copy_from_slice(input);
    cipher.apply_keystream(output);

    trace!(index, bytes = input.len(), "chunk decrypted");
    Ok(())
}

/// Counter value at the start of chunk `index`.
fn chunk_iv(index: usize) -> [u8; 16] {
    let block_offset = (index * CHUNK_SIZE / AES_BLOCK_SIZE) as u128;
    u128::from_be_bytes(AUDIO_IV)
        .wrapping_add(block_offset)
        .to_be_bytes()
}
