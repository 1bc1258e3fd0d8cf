/*
 * Crab, a UCI-compatible chess engine
 * Copyright (C) 2024 Jasper Shovelton
 *
 * Crab is free software: you can redistribute it and/or modify it under the
 * terms of the GNU General Public License as published by the Free Software
 * Foundation, either version 3 of the License, or (at your option) any later
 * version.
 *
 * Crab is distributed in the hope that it will be useful, but WITHOUT ANY
 * WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
 * FOR A PARTICULAR PURPOSE. See the GNU General Public License for more
 * details.
 *
 * You should have received a copy of the GNU General Public License along with
 * Crab. If not, see <https://www.gnu.org/licenses/>.
 */

//! The `bench` command: search a fixed set of positions to a fixed depth and
//! report a reproducible node count and NPS, for comparing engine builds.

use std::{
    sync::mpsc::channel,
    time::Instant,
};

use crate::{
    board::Board,
    search::{Depth, Limits, SharedState, Worker},
    transposition_table::TranspositionTable,
};

/// The depth every position in [`BENCH_POSITIONS`] is searched to, when no
/// explicit depth is given to [`bench`].
const BENCH_DEPTH: u8 = 11;

/// The Kiwipete position, a standard stress-test FEN covering castling, en
/// passant and promotions in one position.
pub(crate) const KIWIPETE_FEN: &str =
    "r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1";

/// A fixed, varied set of positions used for `bench`.
///
/// Results depend on move ordering and pruning decisions, so this set is
/// meant to catch regressions and compare relative speed between builds, not
/// to validate correctness (see [`crate::perft`] for that).
const BENCH_POSITIONS: [&str; 10] = [
    "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1",
    KIWIPETE_FEN,
    "8/2p5/3p4/KP5r/1R3p1k/8/4P1P1/8 w - - 0 1",
    "r3k2r/Pppp1ppp/1b3nbN/nP6/BBP1P3/q4N2/Pp1P2PP/R2Q1RK1 w kq - 0 1",
    "rnbq1k1r/pp1Pbppp/2p5/8/2B5/8/PPP1NnPP/RNBQK2R w KQ - 1 8",
    "r4rk1/1pp1qppp/p1np1n2/2b1p1B1/2B1P1b1/P1NP1N2/1PP1QPPP/R4RK1 w - - 0 10",
    "4rrk1/pp1n3p/3q2pQ/2p1pb2/2PP4/2P3N1/P2B2PP/4RRK1 b - - 7 19",
    "r1bq1r1k/1pp1n1pp/1p1p4/4p2Q/4Pp2/1BNP4/PPP2PPP/3R1RK1 w - - 2 14",
    "r3r1k1/2p2ppp/p7/1p2P1n1/P6q/5P2/1PP2QPP/R1BR2K1 w - - 1 16",
    "3rr1k1/pp3pp1/1qn2np1/8/3p4/PP1R1P2/2P1NQPP/R1B3K1 w - - 0 20",
];

/// Runs the `bench` command: searches every position in [`BENCH_POSITIONS`]
/// to `depth` (or [`BENCH_DEPTH`] if `None`) and prints the total node count
/// and NPS.
pub fn bench(depth: Option<u8>) {
    let depth = depth.unwrap_or(BENCH_DEPTH);
    let (_uci_tx, uci_rx) = channel();
    let state = SharedState::new(uci_rx, TranspositionTable::with_capacity(16));

    let mut total_nodes = 0;
    let start = Instant::now();

    for fen in BENCH_POSITIONS {
        let board: Board = fen.parse().expect("bench positions are hardcoded and valid");
        let mut worker = Worker::new(board, &state);
        worker.set_printing(false);
        worker.set_limits(Limits::Depth(Depth::from(depth)));
        worker.start_search();
        total_nodes += worker.nodes();
    }

    let elapsed_ms = start.elapsed().as_millis().max(1) as u64;
    let nps = total_nodes * 1_000 / elapsed_ms;

    println!("Nodes searched: {total_nodes}");
    println!("Nodes/second: {nps}");
}
