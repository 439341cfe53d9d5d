// Copyright (C) myl7
// SPDX-License-Identifier: Apache-2.0

//! Fixed-format little-endian encoding of everything that crosses a party boundary.

use crate::dpf::{DpfNode, NODE_BLEN};
use crate::share::{AShare, BShare, XShare};
use crate::{MpcError, Value};

/// Source of wire bytes: a byte slice, or a party connection (see [`crate::mpcio::MpcTio::recv_obj`]).
pub trait WireRead {
    fn read_bytes(&mut self, buf: &mut [u8]) -> Result<(), MpcError>;
}

impl WireRead for &[u8] {
    fn read_bytes(&mut self, buf: &mut [u8]) -> Result<(), MpcError> {
        if self.len() < buf.len() {
            return Err(MpcError::Truncated);
        }
        let (head, tail) = self.split_at(buf.len());
        buf.copy_from_slice(head);
        *self = tail;
        Ok(())
    }
}

pub trait WireFormat: Sized {
    fn write_to(&self, out: &mut Vec<u8>);
    fn read_from<R: WireRead + ?Sized>(input: &mut R) -> Result<Self, MpcError>;

    fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.write_to(&mut out);
        out
    }
}

pub(crate) fn read_array<const N: usize, R: WireRead + ?Sized>(
    input: &mut R,
) -> Result<[u8; N], MpcError> {
    let mut buf = [0; N];
    input.read_bytes(&mut buf)?;
    Ok(buf)
}

impl WireFormat for bool {
    fn write_to(&self, out: &mut Vec<u8>) {
        out.push(*self as u8);
    }

    fn read_from<R: WireRead + ?Sized>(input: &mut R) -> Result<Self, MpcError> {
        let [b] = read_array::<1, _>(input)?;
        Ok(b & 1 == 1)
    }
}

impl WireFormat for u8 {
    fn write_to(&self, out: &mut Vec<u8>) {
        out.push(*self);
    }

    fn read_from<R: WireRead + ?Sized>(input: &mut R) -> Result<Self, MpcError> {
        let [b] = read_array::<1, _>(input)?;
        Ok(b)
    }
}

impl WireFormat for u32 {
    fn write_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.to_le_bytes());
    }

    fn read_from<R: WireRead + ?Sized>(input: &mut R) -> Result<Self, MpcError> {
        Ok(u32::from_le_bytes(read_array(input)?))
    }
}

impl WireFormat for Value {
    fn write_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.to_le_bytes());
    }

    fn read_from<R: WireRead + ?Sized>(input: &mut R) -> Result<Self, MpcError> {
        Ok(Value::from_le_bytes(read_array(input)?))
    }
}

impl WireFormat for DpfNode {
    fn write_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.0);
    }

    fn read_from<R: WireRead + ?Sized>(input: &mut R) -> Result<Self, MpcError> {
        Ok(DpfNode(read_array::<NODE_BLEN, _>(input)?))
    }
}

impl WireFormat for AShare {
    fn write_to(&self, out: &mut Vec<u8>) {
        self.0.write_to(out);
    }

    fn read_from<R: WireRead + ?Sized>(input: &mut R) -> Result<Self, MpcError> {
        Ok(Self(Value::read_from(input)?))
    }
}

impl WireFormat for XShare {
    fn write_to(&self, out: &mut Vec<u8>) {
        self.0.write_to(out);
    }

    fn read_from<R: WireRead + ?Sized>(input: &mut R) -> Result<Self, MpcError> {
        Ok(Self(Value::read_from(input)?))
    }
}

impl WireFormat for BShare {
    fn write_to(&self, out: &mut Vec<u8>) {
        self.0.write_to(out);
    }

    fn read_from<R: WireRead + ?Sized>(input: &mut R) -> Result<Self, MpcError> {
        Ok(Self(bool::read_from(input)?))
    }
}
