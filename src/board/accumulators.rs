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

//! Incremental updates to the phase, score and Zobrist key accumulators kept
//! on [`Board`].
//!
//! The keys themselves come from [`crate::zobrist`]; this module only knows
//! how to toggle them in and out as pieces move.

use super::{Board, CastlingRights, Key};
use crate::{
    defs::{Piece, PieceType, Square},
    evaluation::{piece_phase, piece_score, Phase, Score},
    zobrist,
};

impl Board {
    /// Returns the accumulated phase of the board.
    pub const fn phase(&self) -> Phase {
        self.phase
    }

    /// Returns the accumulated score of the board.
    pub const fn score(&self) -> Score {
        self.score
    }

    /// Gets the zobrist key.
    pub const fn key(&self) -> Key {
        self.key
    }

    /// Gets the zobrist key for the pawns only.
    pub const fn pawn_key(&self) -> Key {
        self.pawn_key
    }

    /// Moves the accumulated `piece` from `start` to `end`.
    pub fn move_accumulated_piece(&mut self, start: Square, end: Square, piece: Piece) {
        self.move_piece_score(start, end, piece);
        self.move_piece_key(start, end, piece);
    }

    /// Adds `piece` on `square` to the accumulators.
    pub fn add_accumulated_piece(&mut self, square: Square, piece: Piece) {
        self.add_piece_phase(piece);
        self.add_piece_score(square, piece);
        self.toggle_piece_key(square, piece);
    }

    /// Removes `piece` on `square` from the accumulators.
    pub fn remove_accumulated_piece(&mut self, square: Square, piece: Piece) {
        self.remove_piece_phase(piece);
        self.remove_piece_score(square, piece);
        self.toggle_piece_key(square, piece);
    }

    /// Adds the phase weight of `piece` to the phase accumulator.
    fn add_piece_phase(&mut self, piece: Piece) {
        self.phase += piece_phase(piece);
    }

    /// Removes the phase weight of `piece` from the phase accumulator.
    fn remove_piece_phase(&mut self, piece: Piece) {
        self.phase -= piece_phase(piece);
    }

    /// Adds the piece-square value of `piece` on `square` to the score
    /// accumulator.
    fn add_piece_score(&mut self, square: Square, piece: Piece) {
        self.score += piece_score(square, piece);
    }

    /// Removes the piece-square value of `piece` on `square` from the score
    /// accumulator.
    fn remove_piece_score(&mut self, square: Square, piece: Piece) {
        self.score -= piece_score(square, piece);
    }

    /// Removes the zobrist key of `piece` on `start` and adds it on `end`.
    fn move_piece_key(&mut self, start: Square, end: Square, piece: Piece) {
        self.toggle_piece_key(start, piece);
        self.toggle_piece_key(end, piece);
    }

    /// Toggles the zobrist key of `piece` standing on `square`.
    ///
    /// Does nothing if `piece` is [`Piece::NONE`], since that piece has no
    /// key, but callers never pass it regardless.
    fn toggle_piece_key(&mut self, square: Square, piece: Piece) {
        if piece != Piece::NONE {
            self.key ^= zobrist::piece_square_key(piece, square);
            if PieceType::from(piece) == PieceType::PAWN {
                self.pawn_key ^= zobrist::piece_square_key(piece, square);
            }
        }
    }

    /// Toggles the side to move zobrist key.
    pub fn toggle_side_key(&mut self) {
        self.key ^= zobrist::side_to_move_key();
    }

    /// Toggles the zobrist keys of the given castling rights.
    pub fn toggle_castling_rights_key(&mut self, rights: CastlingRights) {
        self.key ^= zobrist::castling_key(rights.0);
    }

    /// Toggles the zobrist keys of the given en passant square.
    ///
    /// Does nothing if `square` is [`Square::NONE`].
    pub fn toggle_ep_square_key(&mut self, square: Square) {
        self.key ^= zobrist::ep_key(square);
    }
}
