//! Shrike, a UCI-compatible chess engine.

/// Bitboard representation and iteration.
mod bitboard;
/// Items related to the board. Mainly [`Board`](board::Board).
mod board;
/// Definitions and enumerations.
mod defs;
/// Parse errors for FEN/move/option strings.
mod error;
/// Static evaluation.
mod evaluation;
/// Precomputed lookup tables built by `build.rs`.
mod lookups;
/// Legal move generation. Mainly [`generate_moves`](movegen::generate_moves).
mod movegen;
/// Node-count utility for the `go perft`/`perft` debug command.
mod perft;
/// Iterative-deepening alpha-beta search, move ordering and time management.
mod search;
/// A fixed-size set of benchmark positions searched to a fixed depth.
mod bench;
/// The shared, lock-free transposition table.
mod transposition_table;
/// Handles UCI input and output.
pub mod uci;
/// Small helpers shared across modules.
mod util;
/// Zobrist key tables and incremental hashing.
mod zobrist;
