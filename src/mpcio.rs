// Copyright (C) myl7
// SPDX-License-Identifier: Apache-2.0

//! Party-to-party I/O.
//!
//! Every party runs the same protocol code in lockstep on its own thread with one [`MpcTio`] per worker thread.
//! Outgoing data is queued per destination and flushed by [`MpcTio::send`] as one framed message per destination:
//!
//! ```text
//! len: u32 LE | lamport: u32 LE | payload (len bytes)
//! ```
//!
//! Receiving blocks until enough payload bytes arrived, which is the only place a protocol suspends.
//! The Lamport clock is bumped on every flush and merged on every received frame,
//! so [`MpcTio::lamport`] counts the causal rounds a protocol took.

use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::preproc::PrecompStore;
use crate::wire::{read_array, WireFormat, WireRead};
use crate::{MpcError, Player, SERVER};

const HEADER_BLEN: usize = 8;

/// A reliable ordered message pipe to one other party.
///
/// Requires `Send` so a [`MpcTio`] can be moved onto its worker thread.
pub trait Channel: Send {
    fn send_msg(&mut self, msg: Vec<u8>) -> Result<(), MpcError>;
    fn recv_msg(&mut self) -> Result<Vec<u8>, MpcError>;
}

/// In-process [`Channel`] over a pair of mpsc queues.
pub struct MemChannel {
    remote: Player,
    tx: Sender<Vec<u8>>,
    rx: Receiver<Vec<u8>>,
}

impl MemChannel {
    /// Returns the end held by `a` and the end held by `b`.
    pub fn pair(a: Player, b: Player) -> (Self, Self) {
        let (tx_ab, rx_ab) = mpsc::channel();
        let (tx_ba, rx_ba) = mpsc::channel();
        (
            Self {
                remote: b,
                tx: tx_ab,
                rx: rx_ba,
            },
            Self {
                remote: a,
                tx: tx_ba,
                rx: rx_ab,
            },
        )
    }
}

impl Channel for MemChannel {
    fn send_msg(&mut self, msg: Vec<u8>) -> Result<(), MpcError> {
        self.tx
            .send(msg)
            .map_err(|_| MpcError::Disconnected(self.remote))
    }

    fn recv_msg(&mut self) -> Result<Vec<u8>, MpcError> {
        self.rx
            .recv()
            .map_err(|_| MpcError::Disconnected(self.remote))
    }
}

struct Link {
    channel: Box<dyn Channel>,
    outbuf: Vec<u8>,
    inbuf: Vec<u8>,
    inpos: usize,
}

impl Link {
    fn new(channel: Box<dyn Channel>) -> Self {
        Self {
            channel,
            outbuf: Vec::new(),
            inbuf: Vec::new(),
            inpos: 0,
        }
    }
}

/// Traffic and work counters of one [`MpcTio`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TioStats {
    pub msgs_sent: usize,
    pub msg_bytes_sent: usize,
    pub aes_ops: usize,
    pub lamport: u32,
}

/// One party's connections for one worker thread.
pub struct MpcTio {
    player: Player,
    thread_num: usize,
    links: [Option<Link>; 3],
    lamport: u32,
    msgs_sent: usize,
    msg_bytes_sent: usize,
    aes_ops: usize,
    rng: StdRng,
    pub(crate) store: PrecompStore,
    /// Set during a preprocessing run, where correlations are dealt online instead of taken from the store
    pub(crate) preprocessing: bool,
}

impl MpcTio {
    /// `channels` lists the connection to each other party.
    /// P0 and P1 need one to each other and one to P2, P2 needs one to each of P0 and P1.
    pub fn new(
        player: Player,
        thread_num: usize,
        channels: Vec<(Player, Box<dyn Channel>)>,
    ) -> Result<Self, MpcError> {
        if player > SERVER {
            return Err(MpcError::InvalidPlayer(player));
        }
        let mut links: [Option<Link>; 3] = [None, None, None];
        for (remote, channel) in channels {
            if remote > SERVER || remote == player {
                return Err(MpcError::InvalidPlayer(remote));
            }
            links[remote as usize] = Some(Link::new(channel));
        }
        Ok(Self {
            player,
            thread_num,
            links,
            lamport: 0,
            msgs_sent: 0,
            msg_bytes_sent: 0,
            aes_ops: 0,
            rng: StdRng::from_entropy(),
            store: PrecompStore::default(),
            preprocessing: false,
        })
    }

    pub fn player(&self) -> Player {
        self.player
    }

    pub fn is_server(&self) -> bool {
        self.player == SERVER
    }

    /// The other computational party.
    pub fn peer(&self) -> Player {
        assert!(!self.is_server(), "the helper party has no peer");
        1 - self.player
    }

    pub fn thread_num(&self) -> usize {
        self.thread_num
    }

    pub fn lamport(&self) -> u32 {
        self.lamport
    }

    pub fn rng(&mut self) -> &mut StdRng {
        &mut self.rng
    }

    pub fn aes_ops(&mut self) -> &mut usize {
        &mut self.aes_ops
    }

    pub fn stats(&self) -> TioStats {
        TioStats {
            msgs_sent: self.msgs_sent,
            msg_bytes_sent: self.msg_bytes_sent,
            aes_ops: self.aes_ops,
            lamport: self.lamport,
        }
    }

    fn link(&mut self, remote: Player) -> Result<&mut Link, MpcError> {
        self.links
            .get_mut(remote as usize)
            .and_then(Option::as_mut)
            .ok_or(MpcError::InvalidPlayer(remote))
    }

    /// Queue raw bytes to `to`, sent at the next [`MpcTio::send`].
    pub fn queue(&mut self, to: Player, data: &[u8]) -> Result<(), MpcError> {
        self.link(to)?.outbuf.extend_from_slice(data);
        Ok(())
    }

    pub fn queue_obj<T: WireFormat>(&mut self, to: Player, obj: &T) -> Result<(), MpcError> {
        obj.write_to(&mut self.link(to)?.outbuf);
        Ok(())
    }

    pub fn queue_peer<T: WireFormat>(&mut self, obj: &T) -> Result<(), MpcError> {
        self.queue_obj(self.peer(), obj)
    }

    pub fn queue_server<T: WireFormat>(&mut self, obj: &T) -> Result<(), MpcError> {
        self.queue_obj(SERVER, obj)
    }

    pub fn queue_p0<T: WireFormat>(&mut self, obj: &T) -> Result<(), MpcError> {
        self.queue_obj(0, obj)
    }

    pub fn queue_p1<T: WireFormat>(&mut self, obj: &T) -> Result<(), MpcError> {
        self.queue_obj(1, obj)
    }

    /// Flush every non-empty queue as one framed message.
    pub fn send(&mut self) -> Result<(), MpcError> {
        self.lamport += 1;
        let lamport = self.lamport;
        for link in self.links.iter_mut().flatten() {
            if link.outbuf.is_empty() {
                continue;
            }
            let payload = std::mem::take(&mut link.outbuf);
            let mut frame = Vec::with_capacity(HEADER_BLEN + payload.len());
            frame.extend_from_slice(&(payload.len() as u32).to_le_bytes());
            frame.extend_from_slice(&lamport.to_le_bytes());
            frame.extend_from_slice(&payload);
            self.msgs_sent += 1;
            self.msg_bytes_sent += frame.len();
            link.channel.send_msg(frame)?;
        }
        Ok(())
    }

    /// Fill `buf` with the next bytes from `from`, blocking as needed.
    pub fn recv(&mut self, from: Player, buf: &mut [u8]) -> Result<(), MpcError> {
        let mut filled = 0;
        while filled < buf.len() {
            let link = self.link(from)?;
            if link.inpos == link.inbuf.len() {
                let frame = link.channel.recv_msg()?;
                let mut header = &frame[..frame.len().min(HEADER_BLEN)];
                let len = u32::from_le_bytes(read_array(&mut header)?) as usize;
                let lamport = u32::from_le_bytes(read_array(&mut header)?);
                if frame.len() != HEADER_BLEN + len {
                    return Err(MpcError::Truncated);
                }
                link.inbuf = frame;
                link.inpos = HEADER_BLEN;
                self.lamport = self.lamport.max(lamport) + 1;
                continue;
            }
            let n = (buf.len() - filled).min(link.inbuf.len() - link.inpos);
            buf[filled..filled + n].copy_from_slice(&link.inbuf[link.inpos..link.inpos + n]);
            link.inpos += n;
            filled += n;
        }
        Ok(())
    }

    pub fn recv_obj<T: WireFormat>(&mut self, from: Player) -> Result<T, MpcError> {
        T::read_from(&mut TioReader { tio: self, from })
    }

    pub fn recv_peer<T: WireFormat>(&mut self) -> Result<T, MpcError> {
        self.recv_obj(self.peer())
    }

    pub fn recv_server<T: WireFormat>(&mut self) -> Result<T, MpcError> {
        self.recv_obj(SERVER)
    }

    pub fn recv_p0<T: WireFormat>(&mut self) -> Result<T, MpcError> {
        self.recv_obj(0)
    }

    pub fn recv_p1<T: WireFormat>(&mut self) -> Result<T, MpcError> {
        self.recv_obj(1)
    }
}

impl Drop for MpcTio {
    fn drop(&mut self) {
        log::debug!(
            "P{} thread {}: {} msgs, {} bytes sent, {} AES ops, lamport {}",
            self.player,
            self.thread_num,
            self.msgs_sent,
            self.msg_bytes_sent,
            self.aes_ops,
            self.lamport
        );
    }
}

struct TioReader<'a> {
    tio: &'a mut MpcTio,
    from: Player,
}

impl WireRead for TioReader<'_> {
    fn read_bytes(&mut self, buf: &mut [u8]) -> Result<(), MpcError> {
        self.tio.recv(self.from, buf)
    }
}

/// Connected [`MpcTio`]s for P0, P1, and P2 over in-process channels.
pub fn local_tios(thread_num: usize) -> Result<[MpcTio; 3], MpcError> {
    let (c01, c10) = MemChannel::pair(0, 1);
    let (c02, c20) = MemChannel::pair(0, 2);
    let (c12, c21) = MemChannel::pair(1, 2);
    Ok([
        MpcTio::new(
            0,
            thread_num,
            vec![(1, Box::new(c01) as Box<dyn Channel>), (2, Box::new(c02))],
        )?,
        MpcTio::new(
            1,
            thread_num,
            vec![(0, Box::new(c10) as Box<dyn Channel>), (2, Box::new(c12))],
        )?,
        MpcTio::new(
            2,
            thread_num,
            vec![(0, Box::new(c20) as Box<dyn Channel>), (1, Box::new(c21))],
        )?,
    ])
}

/// Run `f` as P0, P1, and P2 on three threads connected in-process.
///
/// Returns the outputs indexed by party, or the first party's error.
/// A panic in any party is propagated.
pub fn run_local<F, R>(f: F) -> Result<[R; 3], MpcError>
where
    F: Fn(&mut MpcTio) -> Result<R, MpcError> + Sync,
    R: Send,
{
    let tios = local_tios(0)?;
    let f = &f;
    let [r0, r1, r2] = thread::scope(|scope| {
        let handles = tios.map(|mut tio| scope.spawn(move || f(&mut tio)));
        handles.map(|handle| {
            handle
                .join()
                .unwrap_or_else(|err| std::panic::resume_unwind(err))
        })
    });
    Ok([r0?, r1?, r2?])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::init_logger;
    use crate::Value;

    #[test]
    fn test_frames_and_lamport() {
        init_logger();
        let [r0, r1, r2] = run_local(|tio| match tio.player() {
            0 => {
                tio.queue_peer(&7u32)?;
                tio.queue_server(&true)?;
                tio.send()?;
                let x: Value = tio.recv_peer()?;
                Ok((x, tio.lamport()))
            }
            1 => {
                let y: u32 = tio.recv_peer()?;
                tio.queue_peer(&(y as Value * 6))?;
                tio.send()?;
                Ok((y as Value, tio.lamport()))
            }
            _ => {
                let b: bool = tio.recv_p0()?;
                Ok((b as Value, tio.lamport()))
            }
        })
        .unwrap();
        // P0 sends at 1, P1 receives (2) and sends at 3, P0 receives at 4.
        assert_eq!(r0, (42, 4));
        assert_eq!(r1, (7, 3));
        assert_eq!(r2, (1, 2));
    }

    #[test]
    fn test_recv_spans_frames() {
        let [r0, r1, _] = run_local(|tio| match tio.player() {
            0 => {
                tio.queue(1, &[1, 2, 3])?;
                tio.send()?;
                tio.queue(1, &[4, 5])?;
                tio.send()?;
                Ok(vec![])
            }
            1 => {
                let mut buf = [0; 5];
                tio.recv(0, &mut buf)?;
                Ok(buf.to_vec())
            }
            _ => Ok(vec![]),
        })
        .unwrap();
        assert!(r0.is_empty());
        assert_eq!(r1, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_stats_count_framed_bytes() {
        let [s0, _, _] = run_local(|tio| {
            if tio.player() == 0 {
                tio.queue_peer(&(1 as Value))?;
                tio.send()?;
            } else if tio.player() == 1 {
                let _: Value = tio.recv_peer()?;
            }
            Ok(tio.stats())
        })
        .unwrap();
        assert_eq!(s0.msgs_sent, 1);
        assert_eq!(s0.msg_bytes_sent, HEADER_BLEN + 8);
    }

    #[test]
    fn test_disconnect_is_an_error() {
        let res = run_local(|tio| {
            if tio.player() == 1 {
                let _: Value = tio.recv_peer()?;
            }
            Ok(())
        });
        assert!(matches!(res, Err(MpcError::Disconnected(0))));
    }

    #[test]
    fn test_invalid_player() {
        assert!(matches!(
            MpcTio::new(3, 0, vec![]),
            Err(MpcError::InvalidPlayer(3))
        ));
        let [mut p0, _, _] = local_tios(0).unwrap();
        let mut buf = [0; 4];
        assert!(matches!(p0.recv(3, &mut buf), Err(MpcError::InvalidPlayer(3))));
        assert!(matches!(p0.recv(0, &mut buf), Err(MpcError::InvalidPlayer(0))));
    }
}
