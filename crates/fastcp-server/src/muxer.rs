//! Reassembly muxer: collects decoded chunks from `N` worker outputs and
//! delivers them to the writer in strict ascending sequence order.

use std::collections::HashMap;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tracing::warn;

use fastcp_core::constants::MUXER_INPUT_DEPTH;

/// A chunk after decrypt and decompress, ready for the writer.
#[derive(Debug)]
pub struct DecodedChunk {
    pub seq: u32,
    pub data: Vec<u8>,
}

/// Start the muxer task over `forks` input channels.
///
/// The muxer owns `next_seq` (initially 1) and a bounded out-of-order
/// buffer. Chunks arriving ahead of sequence are buffered up to `max_ooc`;
/// past that they are dropped with a corruption warning and the final
/// checksum surfaces the damage. When every input has closed, the buffer is
/// drained in ascending order as far as the sequence is gap-free; leftover
/// chunks mean a hole and are reported.
pub fn start(
    max_ooc: usize,
    out: mpsc::Sender<Vec<u8>>,
    forks: usize,
) -> Vec<mpsc::Sender<DecodedChunk>> {
    let mut senders: Vec<mpsc::Sender<DecodedChunk>> = Vec::with_capacity(forks);
    let mut inputs = Vec::with_capacity(forks);
    for _ in 0..forks {
        let (tx, rx) = mpsc::channel(MUXER_INPUT_DEPTH);
        senders.push(tx);
        inputs.push(rx);
    }

    tokio::spawn(async move {
        let mut next_seq: u32 = 1;
        let mut buffered: HashMap<u32, DecodedChunk> = HashMap::new();

        'rounds: loop {
            let mut active = 0;
            let mut progressed = false;

            for rx in inputs.iter_mut() {
                match rx.try_recv() {
                    Ok(chunk) => {
                        active += 1;
                        progressed = true;

                        if chunk.seq == next_seq {
                            if out.send(chunk.data).await.is_err() {
                                break 'rounds;
                            }
                            next_seq += 1;
                        } else if buffered.len() < max_ooc {
                            buffered.insert(chunk.seq, chunk);
                        } else {
                            warn!(
                                seq = chunk.seq,
                                "out-of-order buffer full, dropping chunk; data WILL be corrupted"
                            );
                        }

                        // Drain any buffered run that became contiguous.
                        while let Some(next) = buffered.remove(&next_seq) {
                            if out.send(next.data).await.is_err() {
                                break 'rounds;
                            }
                            next_seq += 1;
                        }
                    }
                    Err(TryRecvError::Empty) => active += 1,
                    Err(TryRecvError::Disconnected) => {}
                }
            }

            if active == 0 {
                break;
            }
            if !progressed {
                tokio::task::yield_now().await;
            }
        }

        // Inputs closed; flush whatever is still contiguous.
        while let Some(next) = buffered.remove(&next_seq) {
            if out.send(next.data).await.is_err() {
                break;
            }
            next_seq += 1;
        }

        if !buffered.is_empty() {
            warn!(
                missing_seq = next_seq,
                stranded = buffered.len(),
                "not all chunks received; data corrupted"
            );
        }
    });

    senders
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn run_muxer(
        forks: usize,
        max_ooc: usize,
        arrivals: Vec<(usize, DecodedChunk)>,
    ) -> Vec<Vec<u8>> {
        let (out_tx, mut out_rx) = mpsc::channel(64);
        let inputs = start(max_ooc, out_tx, forks);

        tokio::spawn(async move {
            for (fork, chunk) in arrivals {
                if inputs[fork].send(chunk).await.is_err() {
                    return;
                }
            }
        });

        let mut emitted = Vec::new();
        while let Some(data) = out_rx.recv().await {
            emitted.push(data);
        }
        emitted
    }

    fn chunk(seq: u32) -> DecodedChunk {
        DecodedChunk {
            seq,
            data: vec![seq as u8; 8],
        }
    }

    #[tokio::test]
    async fn in_order_passthrough() {
        let arrivals = (1..=8).map(|s| (0usize, chunk(s))).collect();
        let emitted = run_muxer(1, 256, arrivals).await;

        assert_eq!(emitted.len(), 8);
        for (i, data) in emitted.iter().enumerate() {
            assert_eq!(data[0], (i + 1) as u8);
        }
    }

    #[tokio::test]
    async fn scrambled_arrivals_emit_in_sequence() {
        // Four workers delivering seqs 1..16 in a scrambled but bounded order.
        let order = [3, 1, 4, 2, 7, 5, 8, 6, 11, 9, 12, 10, 15, 13, 16, 14];
        let arrivals = order
            .iter()
            .enumerate()
            .map(|(i, &seq)| (i % 4, chunk(seq)))
            .collect();

        let emitted = run_muxer(4, 256, arrivals).await;
        assert_eq!(emitted.len(), 16);
        for (i, data) in emitted.iter().enumerate() {
            assert_eq!(data[0], (i + 1) as u8, "position {i} out of order");
        }
    }

    #[tokio::test]
    async fn buffer_overflow_drops_and_continues() {
        // max_ooc=2: seqs 4 and 3 buffer, 2 is dropped, 1 flows through.
        let arrivals = vec![
            (0usize, chunk(4)),
            (0, chunk(3)),
            (0, chunk(2)),
            (0, chunk(1)),
        ];

        let emitted = run_muxer(1, 2, arrivals).await;

        // 1 emits; 2 was dropped, so 3 and 4 stay stranded behind the hole.
        assert_eq!(emitted.len(), 1);
        assert_eq!(emitted[0][0], 1);
    }

    #[tokio::test]
    async fn duplicate_seq_replaces_buffered_entry() {
        let mut dup = chunk(3);
        dup.data = vec![0xEE; 8];

        let arrivals = vec![
            (0usize, chunk(3)),
            (0, dup),
            (0, chunk(1)),
            (0, chunk(2)),
        ];

        let emitted = run_muxer(1, 256, arrivals).await;
        assert_eq!(emitted.len(), 3);
        assert_eq!(emitted[2], vec![0xEE; 8]);
    }

    #[tokio::test]
    async fn hole_at_close_strands_chunks() {
        // Seq 1 then 3; 2 never arrives.
        let arrivals = vec![(0usize, chunk(1)), (0, chunk(3))];

        let emitted = run_muxer(1, 256, arrivals).await;
        assert_eq!(emitted.len(), 1);
        assert_eq!(emitted[0][0], 1);
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(64))]

            /// Any permutation of 1..=n across any fork layout emits in
            /// strict ascending order while the buffer bound holds.
            #[test]
            fn any_permutation_linearizes(
                n in 1u32..64,
                forks in 1usize..6,
                seed in any::<u64>(),
            ) {
                let mut seqs: Vec<u32> = (1..=n).collect();

                // Deterministic Fisher-Yates from the seed.
                let mut state = seed | 1;
                for i in (1..seqs.len()).rev() {
                    state = state
                        .wrapping_mul(6_364_136_223_846_793_005)
                        .wrapping_add(1_442_695_040_888_963_407);
                    let j = (state >> 33) as usize % (i + 1);
                    seqs.swap(i, j);
                }

                let rt = tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .unwrap();
                let emitted = rt.block_on(async {
                    let arrivals = seqs
                        .iter()
                        .enumerate()
                        .map(|(i, &seq)| (i % forks, chunk(seq)))
                        .collect();
                    run_muxer(forks, 256, arrivals).await
                });

                prop_assert_eq!(emitted.len(), n as usize);
                for (i, data) in emitted.iter().enumerate() {
                    prop_assert_eq!(data[0], (i + 1) as u8);
                }
            }
        }
    }

    #[tokio::test]
    async fn uneven_workers_still_linearize() {
        // One worker delivers most chunks, another trickles the rest.
        let mut arrivals = Vec::new();
        for seq in [2u32, 4, 6, 8, 10] {
            arrivals.push((0usize, chunk(seq)));
        }
        for seq in [1u32, 3, 5, 7, 9] {
            arrivals.push((1usize, chunk(seq)));
        }

        let emitted = run_muxer(2, 256, arrivals).await;
        assert_eq!(emitted.len(), 10);
        for (i, data) in emitted.iter().enumerate() {
            assert_eq!(data[0], (i + 1) as u8);
        }
    }
}
