// Copyright (C) myl7
// SPDX-License-Identifier: Apache-2.0

//! Matyas-Meyer-Oseas one-way compression over a block cipher,
//! https://wikipedia.org/wiki/One-way_compression_function .
//!
//! Only one round with a fixed key is done, which is what the node PRG needs.
//! `Sync` so the PRG keys can be shared by eval threads.

use aes::cipher::generic_array::GenericArray;
use aes::cipher::BlockEncrypt;
use aes::Aes128;

use crate::utils::xor_inplace;

pub trait MatyasMeyerOseas<const BLK_SIZE: usize>: Sync {
    fn enc_blk(&self, buf: &mut [u8; BLK_SIZE], input: &[u8; BLK_SIZE]);
    fn gen_blk(&self, buf: &mut [u8; BLK_SIZE], input: &[u8; BLK_SIZE]) {
        self.enc_blk(buf, input);
        xor_inplace(buf, &[input]);
    }
}

impl MatyasMeyerOseas<16> for Aes128 {
    fn enc_blk(&self, buf: &mut [u8; 16], input: &[u8; 16]) {
        let in_block = GenericArray::from_slice(input);
        let out_block = GenericArray::from_mut_slice(buf);
        self.encrypt_block_b2b(in_block, out_block);
    }
}

#[cfg(test)]
mod tests {
    use aes::cipher::KeyInit;

    use super::*;

    #[test]
    fn test_gen_blk_is_enc_xor_input() {
        let cipher = Aes128::new(GenericArray::from_slice(&[7; 16]));
        let input = [0x5a; 16];
        let mut enc = [0; 16];
        cipher.enc_blk(&mut enc, &input);
        let mut out = [0; 16];
        cipher.gen_blk(&mut out, &input);
        assert_ne!(out, enc);
        xor_inplace(&mut out, &[&input]);
        assert_eq!(out, enc);
    }
}
