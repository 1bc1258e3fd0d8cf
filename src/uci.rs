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

use std::{
    fs::OpenOptions,
    io::{stdin, Write},
    ops::RangeInclusive,
    process::exit,
    str::FromStr,
    sync::mpsc::{channel, RecvError},
    thread::{scope, spawn},
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use crate::{
    bench::{bench, KIWIPETE_FEN},
    board::Board,
    defs::{File, PieceType, Side},
    evaluation::evaluate,
    movegen::{generate_moves, AllMoves, Move, Moves},
    perft::{perft, run_test_suite},
    search::{Depth, Limits, SearchStatus, SharedState, Worker},
    transposition_table::TranspositionTable,
};

/// A minimal tee sink for the `Debug Log File` option: every line this
/// process reads from or writes to stdin/stdout while a file is set gets a
/// timestamped copy appended to it.
///
/// Owned by [`main_loop`] rather than shared state; output printed directly
/// by a search worker's own thread is not teed.
#[derive(Default)]
struct DebugLog {
    /// The file being appended to, if logging is enabled.
    file: Option<std::fs::File>,
}

impl DebugLog {
    /// Enables or disables logging to `path`.
    ///
    /// An empty path disables logging.
    fn set_file(&mut self, path: &str) {
        self.file = (!path.is_empty())
            .then(|| OpenOptions::new().create(true).append(true).open(path).ok())
            .flatten();
    }

    /// Appends a timestamped, tagged copy of `line` to the log file, if one
    /// is set.
    fn log(&mut self, line: &str, is_input: bool) {
        let Some(file) = &mut self.file else {
            return;
        };
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_secs());
        let tag = if is_input { '<' } else { '>' };
        let _ = writeln!(file, "[{now}] {tag} {line}");
    }
}

/// The UCI options this engine supports.
#[derive(Clone)]
pub struct UciOptions {
    /// The overhead of sending a move from the engine to the GUI.
    move_overhead: Duration,
    /// How many threads should be used.
    threads: usize,
    /// How large the transposition table should be, in MiB.
    hash: usize,
    /// The path the `Debug Log File` option is set to, or empty if disabled.
    debug_log_file: String,
}

/// The name of the author of this engine.
const ID_AUTHOR: &str = "Jasper Shovelton";
/// The name of this engine.
const ID_NAME: &str = "Shrike";
/// The version of this engine.
const ID_VERSION: &str = env!("CARGO_PKG_VERSION");

#[allow(clippy::missing_docs_in_private_items)]
impl UciOptions {
    /// The range that the move overhead can take, in milliseconds.
    pub const MOVE_OVERHEAD_RANGE: RangeInclusive<u64> = 0..=1_000;
    /// The range that the number of threads can take.
    ///
    /// Reserved: this engine searches with a single worker thread, so
    /// setting it has no effect.
    pub const THREAD_RANGE: RangeInclusive<usize> = 1..=1;
    /// The range that the hash size can take, in MiB.
    pub const HASH_RANGE: RangeInclusive<usize> = 1..=1_048_576;
}

impl Default for UciOptions {
    fn default() -> Self {
        Self {
            move_overhead: Duration::from_millis(16),
            threads: 1,
            hash: 16,
            debug_log_file: String::new(),
        }
    }
}

impl UciOptions {
    /// Creates new [`UciOptions`] with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Prints the identification of this engine and all the UCI options it
    /// supports.
    fn print() {
        let defaults = Self::default();
        let move_overhead_range = Self::MOVE_OVERHEAD_RANGE;
        let thread_range = Self::THREAD_RANGE;
        let hash_range = Self::HASH_RANGE;

        println!("id name {ID_NAME} {ID_VERSION}");
        println!("id author {ID_AUTHOR}");
        println!(
            "option name Move Overhead type spin default {} min {} max {}",
            defaults.move_overhead().as_millis(),
            move_overhead_range.start(),
            move_overhead_range.end(),
        );
        println!(
            "option name Threads type spin default {} min {} max {}",
            defaults.threads(),
            thread_range.start(),
            thread_range.end(),
        );
        println!(
            "option name Hash type spin default {} min {} max {}",
            defaults.hash(),
            hash_range.start(),
            hash_range.end(),
        );
        println!("option name Clear Hash type button");
        println!("option name Debug Log File type string default <empty>");
    }

    /// Sets the move overhead, in milliseconds, clamped in the range
    /// [`MOVE_OVERHEAD_RANGE`](Self::MOVE_OVERHEAD_RANGE).
    pub fn set_move_overhead(&mut self, duration: u64) {
        self.move_overhead = Duration::from_millis(duration.clamp(
            *Self::MOVE_OVERHEAD_RANGE.start(),
            *Self::MOVE_OVERHEAD_RANGE.end(),
        ));
    }

    /// Sets the thread count, clamped in the range
    /// [`THREAD_RANGE`](Self::THREAD_RANGE).
    pub fn set_threads(&mut self, threads: usize) {
        self.threads = threads.clamp(*Self::THREAD_RANGE.start(), *Self::THREAD_RANGE.end());
    }

    /// Sets the hash size, clamped in the range
    /// [`HASH_RANGE`](Self::HASH_RANGE).
    pub fn set_hash(&mut self, hash: usize) {
        self.hash = hash.clamp(*Self::HASH_RANGE.start(), *Self::HASH_RANGE.end());
    }

    /// Sets the path logged UCI traffic is appended to, updating `log`
    /// accordingly. An empty path disables logging.
    fn set_debug_log_file(&mut self, path: &str, log: &mut DebugLog) {
        self.debug_log_file.clear();
        self.debug_log_file.push_str(path);
        log.set_file(path);
    }

    /// Returns the move overhead.
    pub const fn move_overhead(&self) -> Duration {
        self.move_overhead
    }

    /// Returns the number of threads.
    pub const fn threads(&self) -> usize {
        self.threads
    }

    /// Returns the hash size.
    pub const fn hash(&self) -> usize {
        self.hash
    }

    /// Returns the path logged UCI traffic is appended to, or an empty
    /// string if logging is disabled.
    pub fn debug_log_file(&self) -> &str {
        &self.debug_log_file
    }
}

/// Repeatedly waits for a command and executes it according to the UCI
/// protocol.
///
/// Will run until [`recv`](std::sync::mpsc::Receiver::recv) on the UCI
/// receiver returns an error or the process exits.
pub fn main_loop() -> Result<(), RecvError> {
    let (uci_tx, uci_rx) = channel();

    spawn(move || {
        let stdin = stdin();

        for command in stdin.lines() {
            let command = command.expect("error while reading from stdin");
            uci_tx
                .send(command)
                .expect("this thread cannot outlive the main thread");
        }
    });

    let mut options = UciOptions::new();
    let mut board = Board::default();
    let mut state = SharedState::new(uci_rx, TranspositionTable::with_capacity(options.hash()));
    let mut log = DebugLog::default();

    loop {
        let command = state.recv_command()?;
        log.log(&command, true);
        let mut tokens = command.split_whitespace();

        match tokens.next() {
            Some("bench") => {
                let depth = tokens.next().and_then(|d| d.parse().ok());
                bench(depth);
            }
            Some("d" | "debug") => debug_command(tokens, &board),
            Some("eval") => println!("Static eval: {}", evaluate(&board)),
            Some("go") => go(tokens, &board, &state, &options),
            Some("ispseudolegal") => {
                let is_pseudolegal = tokens
                    .next()
                    .and_then(|mv| parse_move(mv, &board))
                    .is_some_and(|mv| board.is_pseudolegal(mv));
                println!("{is_pseudolegal}");
                log.log(&is_pseudolegal.to_string(), false);
            }
            Some("isready") => {
                println!("readyok");
                log.log("readyok", false);
            }
            Some("p") => board.pretty_print(),
            Some("perft") => {
                if let Some(depth) = tokens.next().and_then(|d| d.parse().ok()) {
                    let mut board = board.clone();
                    perft::<true, true>(&mut board, depth);
                }
            }
            Some("position") => set_position(tokens, &mut board),
            Some("setoption") => set_option(tokens, &mut options, &mut state, &mut log),
            Some("stop") => state.stop(),
            Some("test") => run_test_suite(),
            Some("uci") => {
                UciOptions::print();
                println!("uciok");
                log.log("uciok", false);
            }
            Some("ucinewgame") => {
                board.set_startpos();
                state.tt.clear();
            }
            Some("quit") => break Ok(()),
            Some(other) => println!("info string Unrecognised command \"{other}\"."),
            None => (),
        }
    }
}

/// Interprets and executes the `go` command.
fn go<'b, T>(mut given_limits: T, board: &Board, state: &SharedState, options: &UciOptions)
where
    T: Iterator<Item = &'b str>,
{
    let mut limits = Limits::new_timed(Duration::ZERO);
    let mut saw_timed_limit = false;

    while let Some(token) = given_limits.next() {
        let next = given_limits.next();

        match token {
            "wtime" if board.side_to_move() == Side::WHITE => {
                if let Some(time) = parse_time(next) {
                    limits = Limits::new_timed(time);
                    saw_timed_limit = true;
                }
            }
            "btime" if board.side_to_move() == Side::BLACK => {
                if let Some(time) = parse_time(next) {
                    limits = Limits::new_timed(time);
                    saw_timed_limit = true;
                }
            }
            "winc" if board.side_to_move() == Side::WHITE => {
                if let Some(time) = parse_time(next) {
                    limits.set_inc(time);
                }
            }
            "binc" if board.side_to_move() == Side::BLACK => {
                if let Some(time) = parse_time(next) {
                    limits.set_inc(time);
                }
            }
            "movestogo" => {
                if let Some(moves) = parse_into_nonzero_option(next) {
                    limits.set_moves_to_go(moves);
                }
            }
            "depth" => {
                if let Some(depth) = parse_into_nonzero_option::<u8>(next) {
                    limits = Limits::Depth(Depth::from(depth));
                }
            }
            "nodes" => {
                if let Some(nodes) = parse_into_nonzero_option(next) {
                    limits = Limits::Nodes(nodes);
                }
            }
            "movetime" => {
                if let Some(movetime) = parse_time(next) {
                    limits = Limits::Movetime(movetime);
                }
            }
            "infinite" => limits = Limits::Infinite,
            "perft" => {
                if let Some(depth) = parse_into_nonzero_option(next) {
                    let mut board = board.clone();
                    perft::<true, true>(&mut board, depth);
                }
                return;
            }
            _ => (),
        }
    }

    if !saw_timed_limit && matches!(limits, Limits::Timed { .. }) {
        limits = Limits::Infinite;
    }

    state.reset_status();

    // A single worker thread per search, per the reserved (no-op) Threads
    // option: this engine has no Lazy SMP.
    scope(|s| {
        let mut worker = Worker::new(board.clone(), state);
        worker.set_limits(limits);
        worker.set_move_overhead(options.move_overhead());
        worker.set_printing(true);

        s.spawn(move || worker.start_search())
            .join()
            .expect("the search thread panicked");
    });

    // a "quit" sent mid-search is consumed by a worker's own command poll
    // rather than by the main loop, so it has to be checked for here instead
    if state.status() == SearchStatus::Quit {
        exit(0);
    }
}

/// Handles the `d`/`debug` command's subcommands.
///
/// `moves` lists every legal move; `see <move> <threshold>` reports the
/// static exchange result of a move; anything else (including no argument)
/// pretty-prints the board.
fn debug_command<'b, T>(mut tokens: T, board: &Board)
where
    T: Iterator<Item = &'b str>,
{
    match tokens.next() {
        Some("moves") => {
            let mut moves = Moves::new();
            generate_moves::<AllMoves>(board, &mut moves);
            for scored_move in moves.iter() {
                println!("{}", scored_move.mv);
            }
        }
        Some("see") => {
            let Some(mv) = tokens.next().and_then(|mv| parse_move(mv, board)) else {
                println!("info string Invalid move");
                return;
            };
            let Some(threshold) = tokens.next().and_then(|t| t.parse().ok()) else {
                println!("info string Invalid threshold");
                return;
            };
            let result = if board.see(mv, threshold) { "PASS" } else { "FAIL" };
            println!("{mv}/{threshold} => {result}");
        }
        _ => board.pretty_print(),
    }
}

/// Sets the board to a position specified by the `position` command.
///
/// Leaves `board` unchanged if the command fails to parse.
fn set_position<'b, T>(mut tokens: T, old_board: &mut Board)
where
    T: Iterator<Item = &'b str>,
{
    let mut board = match tokens.next() {
        Some("startpos") => Board::default(),
        Some("kiwipete") => KIWIPETE_FEN
            .parse()
            .expect("the kiwipete FEN is a compile-time constant and always valid"),
        Some("fen") => {
            let mut fen_str = String::with_capacity(128);

            // a FEN string has exactly 6 tokens - more or fewer should raise
            // an error later or now respectively
            for _ in 0..6 {
                let Some(token) = tokens.next() else {
                    return;
                };
                fen_str.push_str(token);
                fen_str.push(' ');
            }

            let Ok(b) = fen_str.parse() else {
                println!("info string Invalid FEN position");
                return;
            };
            b
        }
        _ => return,
    };

    if let Some(token) = tokens.next() {
        if token != "moves" {
            return;
        }
    }

    for mv in tokens {
        let Some(mv) = parse_move(mv, &board).filter(|&mv| board.is_pseudolegal(mv)) else {
            return;
        };
        if !board.is_legal(mv) {
            return;
        }
        board.do_move(mv);
    }

    *old_board = board;
}

/// Sets a UCI option from a `setoption` command.
fn set_option<'b, T>(mut tokens: T, options: &mut UciOptions, state: &mut SharedState, log: &mut DebugLog)
where
    T: Iterator<Item = &'b str>,
{
    if tokens.next() != Some("name") {
        return;
    }

    match tokens.next() {
        Some("Debug") => {
            if tokens.next() != Some("Log") {
                return;
            }
            if tokens.next() != Some("File") {
                return;
            }
            if tokens.next() != Some("value") {
                return;
            }
            let path: Vec<&str> = tokens.collect();
            options.set_debug_log_file(&path.join(" "), log);
        }
        Some("Move") => {
            if tokens.next() != Some("Overhead") {
                return;
            }
            if tokens.next() != Some("value") {
                return;
            }
            if let Some(d) = parse_option(tokens.next()) {
                options.set_move_overhead(d);
            }
        }
        Some("Threads") => {
            if tokens.next() != Some("value") {
                return;
            }
            if let Some(t) = parse_option(tokens.next()) {
                options.set_threads(t);
            }
        }
        Some("Hash") => {
            if tokens.next() != Some("value") {
                return;
            }
            if let Some(h) = parse_option(tokens.next()) {
                options.set_hash(h);
                state.tt.resize(h);
            }
        }
        Some("Clear") => {
            if tokens.next() != Some("Hash") {
                return;
            }
            state.tt.clear();
        }
        _ => (),
    }
}

/// Parses a move in long algebraic notation into a [`Move`].
///
/// Returns [`None`] if the move cannot be parsed. The result may still be
/// pseudo-illegal; check with [`Board::is_pseudolegal`].
fn parse_move(string: &str, board: &Board) -> Option<Move> {
    let start = string.get(0..=1)?.parse().ok()?;
    let end = string.get(2..=3)?.parse().ok()?;
    let piece = board.piece_on(start);

    // these are only guaranteed correct if the move turns out to be legal
    let is_promotion = string.len() == 5;
    let is_castling = PieceType::from(piece) == PieceType::KING
        && File::from(start).0.abs_diff(File::from(end).0) == 2;
    let is_en_passant = PieceType::from(piece) == PieceType::PAWN && end == board.ep_square();

    if is_castling {
        let is_white = board.side_to_move() == Side::WHITE;
        let is_kingside = File::from(end).0 >= File::FILE5.0;
        Some(new_castle(is_white, is_kingside))
    } else if is_promotion {
        let promotion_char = string.chars().next_back()?;
        let piece_type = PieceType::try_from(promotion_char).ok()?;
        Some(Move::new_promo_any(start, end, piece_type))
    } else if is_en_passant {
        Some(Move::new_en_passant(start, end))
    } else {
        Some(Move::new(start, end))
    }
}

/// Dispatches to [`Move::new_castle`] with the const generics chosen at
/// runtime.
fn new_castle(is_white: bool, is_kingside: bool) -> Move {
    match (is_white, is_kingside) {
        (true, true) => Move::new_castle::<true, true>(),
        (true, false) => Move::new_castle::<true, false>(),
        (false, true) => Move::new_castle::<false, true>(),
        (false, false) => Move::new_castle::<false, false>(),
    }
}

/// Parses an `Option<&str>` into an `Option<T>`.
///
/// If the parse fails, returns [`None`].
fn parse_option<T: FromStr>(num: Option<&str>) -> Option<T> {
    num.and_then(|t| t.parse::<T>().ok())
}

/// Parses an `Option<&str>` into an `Option<T>`.
///
/// Returns [`None`] if the result of the parse is `0` or an `Err`.
fn parse_into_nonzero_option<T: FromStr + PartialEq<T> + From<u8>>(num: Option<&str>) -> Option<T> {
    parse_option(num).and_then(|t| if t == T::from(0) { None } else { Some(t) })
}

/// Parses an `Option<&str>` into an `Option<Duration>`, where the string is
/// some length of time in milliseconds.
///
/// Returns [`None`] if `num` cannot be parsed. If `num` can be parsed but is
/// negative, returns a small amount of time instead of treating it as a
/// parse failure, since some GUIs send a negative time left during a grace
/// period.
fn parse_time(num: Option<&str>) -> Option<Duration> {
    parse_option::<i64>(num)
        .map(|t| if t < 0 { 1000 } else { t })
        .map(|t| u64::try_from(t).unwrap_or(1000))
        .map(Duration::from_millis)
}
