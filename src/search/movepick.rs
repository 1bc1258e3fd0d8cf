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

use super::history::Histories;
use crate::{
    bitboard::Bitboard,
    board::Board,
    defs::{Piece, PieceType, Side, Square},
    evaluation::Eval,
    movegen::{generate_moves, CapturesOnly, Move, Moves, MovesType, QuietsOnly, ScoredMove, LOOKUPS},
};

/// The stage of move picking.
#[derive(PartialEq)]
enum Stage {
    /// Return the TT move.
    TtMove,
    /// Generate all captures.
    GenerateCaptures,
    /// Return all good captures.
    GoodCaptures,
    /// Return the first killer.
    FirstKiller,
    /// Return the second killer.
    SecondKiller,
    /// Return the counter move.
    CounterMove,
    /// Generate all remaining moves (i.e. quiets).
    GenerateRemaining,
    /// Return all remaining moves (bad captures and quiets).
    Remaining,
}

/// A selector of the next best move in a position.
#[allow(clippy::missing_docs_in_private_items)]
pub struct MovePicker {
    tt_move: Option<Move>,
    killers: [Option<Move>; 2],
    counter_move: Option<Move>,
    see_threshold: Eval,
    stage: Stage,
    moves: Moves,
    skip_quiets: bool,
}

impl MovePicker {
    /// Creates a new [`MovePicker`] based on the information in `board` and
    /// `tt_move`.
    ///
    /// `Type` controls whether quiet moves are generated at all: pass
    /// [`CapturesOnly`] for quiescence search and anything else (normally
    /// [`crate::movegen::AllMoves`]) for the main search.
    ///
    /// `see_threshold` is the cutoff passed to [`Board::see`] when deciding
    /// whether a tactical move is good or bad: `-50` in the main search
    /// (allowing roughly equal trades through) and `0` in quiescence.
    pub fn new<Type: MovesType>(
        tt_move: Option<Move>,
        killers: [Option<Move>; 2],
        counter_move: Option<Move>,
        see_threshold: Eval,
    ) -> Self {
        assert!(
            Type::CAPTURES,
            "the movepicker relies on always generating captures"
        );
        Self {
            tt_move,
            killers,
            counter_move,
            see_threshold,
            stage: Stage::TtMove,
            moves: Moves::new(),
            skip_quiets: !Type::NON_KING_QUIETS && !Type::KING_QUIETS,
        }
    }

    /// Return the next best [`Move`] in the list of legal moves.
    pub fn next(&mut self, board: &Board, histories: &Histories) -> Option<Move> {
        if self.stage == Stage::TtMove {
            self.stage = Stage::GenerateCaptures;
            if self.tt_move.is_some() {
                return self.tt_move;
            }
        }

        if self.stage == Stage::GenerateCaptures {
            self.stage = Stage::GoodCaptures;
            generate_moves::<CapturesOnly>(board, &mut self.moves);
            let len = self.moves.len();
            self.score_range(board, histories, 0, len);
        }

        if self.stage == Stage::GoodCaptures {
            if let Some(scored_move) = self.find_next_best(board) {
                return Some(scored_move.mv);
            }
            // this also skips bad captures
            if self.skip_quiets {
                return None;
            }
            self.stage = Stage::FirstKiller;
        }

        if self.stage == Stage::FirstKiller {
            self.stage = Stage::SecondKiller;
            if self.killers[0] != self.tt_move {
                if let Some(mv) = self.killers[0] {
                    if board.is_pseudolegal_killer(mv) {
                        return Some(mv);
                    }
                }
            }
        }

        if self.stage == Stage::SecondKiller {
            self.stage = Stage::CounterMove;
            if self.killers[1] != self.tt_move {
                if let Some(mv) = self.killers[1] {
                    if board.is_pseudolegal_killer(mv) {
                        return Some(mv);
                    }
                }
            }
        }

        if self.stage == Stage::CounterMove {
            self.stage = Stage::GenerateRemaining;
            if let Some(mv) = self.counter_move {
                if Some(mv) != self.tt_move
                    && Some(mv) != self.killers[0]
                    && Some(mv) != self.killers[1]
                    && board.is_quiet(mv)
                    && board.is_pseudolegal_killer(mv)
                {
                    return Some(mv);
                }
            }
        }

        if self.stage == Stage::GenerateRemaining {
            self.stage = Stage::Remaining;
            let start = self.moves.len();
            generate_moves::<QuietsOnly>(board, &mut self.moves);
            let end = self.moves.len();
            self.score_range(board, histories, start, end);
        }

        debug_assert!(self.stage == Stage::Remaining, "unhandled stage");
        self.find_next_best(board).map(|scored_move| scored_move.mv)
    }

    /// Find the next best move in the current list of generated moves.
    fn find_next_best(&mut self, board: &Board) -> Option<ScoredMove> {
        loop {
            if self.moves.is_empty() {
                return None;
            }

            let mut best_score = -Eval::MAX;
            let mut best_index = 0;
            for (index, scored_move) in self.moves.iter().enumerate() {
                if scored_move.score > best_score {
                    best_score = scored_move.score;
                    best_index = index;
                }
            }

            let scored_move = &mut self.moves[best_index];

            if self.tt_move == Some(scored_move.mv)
                || self.killers[0] == Some(scored_move.mv)
                || self.killers[1] == Some(scored_move.mv)
                || self.counter_move == Some(scored_move.mv)
            {
                self.moves.remove(best_index);
                continue;
            }

            if best_score >= ScoredMove::WINNING_CAPTURE_SCORE
                && !board.see(scored_move.mv, self.see_threshold)
            {
                scored_move.score -= ScoredMove::WINNING_CAPTURE_SCORE;
                continue;
            }

            if self.stage == Stage::GoodCaptures
                && scored_move.score < ScoredMove::WINNING_CAPTURE_SCORE
            {
                return None;
            }

            return Some(self.moves.remove(best_index));
        }
    }

    /// Scores every move in `moves[start..end]`.
    fn score_range(&mut self, board: &Board, histories: &Histories, start: usize, end: usize) {
        for scored_move in &mut self.moves[start..end] {
            score_move(scored_move, board, histories);
        }
    }
}

/// The number of piece types a non-king, non-empty piece can be (pawn through
/// queen), used as the base of the quiet-move score.
const NB_PIECE_TYPE: Eval = PieceType::TOTAL as Eval;

/// The per-piece bonus added to a quiet move's score when it walks a
/// threatened piece to safety, keyed by the moving piece's type.
fn threat_bonus(piece_type: PieceType) -> Eval {
    match piece_type {
        PieceType::QUEEN => 50_000,
        PieceType::ROOK => 25_000,
        PieceType::KNIGHT | PieceType::BISHOP => 15_000,
        _ => 0,
    }
}

/// Returns the type of the least valuable enemy piece attacking `square`,
/// where `square` is relevant to `side` (i.e. `side`'s piece stands there, or
/// would after moving there).
fn weakest_attacker(board: &Board, side: Side, square: Square) -> Option<PieceType> {
    board
        .attackers_of(side, square)
        .into_iter()
        .map(|attacker| PieceType::from(board.piece_on(attacker)))
        .min_by_key(|piece_type| piece_type.to_index())
}

/// Checks if any enemy piece of exactly `attacker_type` attacks `square`.
fn is_attacked_by(board: &Board, side: Side, square: Square, attacker_type: PieceType) -> bool {
    board
        .attackers_of(side, square)
        .into_iter()
        .any(|attacker| PieceType::from(board.piece_on(attacker)) == attacker_type)
}

/// Returns the squares attacked by a `piece_type` of `side` standing on
/// `square`, given the current occupancy.
fn attacks_from(board: &Board, square: Square, piece_type: PieceType, side: Side) -> Bitboard {
    let occupancies = board.occupancies();
    match piece_type {
        PieceType::PAWN => LOOKUPS.pawn_attacks(side, square),
        PieceType::KNIGHT => LOOKUPS.knight_attacks(square),
        PieceType::BISHOP => LOOKUPS.bishop_attacks(square, occupancies),
        PieceType::ROOK => LOOKUPS.rook_attacks(square, occupancies),
        PieceType::QUEEN => LOOKUPS.queen_attacks(square, occupancies),
        _ => LOOKUPS.king_attacks(square),
    }
}

/// Assigns a move-ordering score to `scored_move`.
///
/// Captures and queen promotions are scored eagerly above
/// [`ScoredMove::WINNING_CAPTURE_SCORE`] by MVV-LVA and promotion bonus;
/// whether they're actually winning is checked lazily in
/// [`MovePicker::find_next_best`] via SEE, and demoted below the floor if
/// not. Everything else, including non-queen promotions, is quiet: scored by
/// piece type, a threat-evasion bonus, butterfly history and a checking-move
/// bonus, floored at [`ScoredMove::QUIET_SCORE`]. Within that floor, a raw
/// score of at least `-4000` is a "good" quiet; anything lower is a "bad"
/// quiet that naturally sorts after every good quiet and most tacticals.
fn score_move(scored_move: &mut ScoredMove, board: &Board, histories: &Histories) {
    let mv = scored_move.mv;
    let captured = board.piece_on(mv.to());
    let is_capture = mv.is_en_passant() || captured != Piece::NONE;
    let is_queen_promotion = mv.is_promotion() && mv.promotion_piece() == PieceType::QUEEN;

    if is_capture || is_queen_promotion {
        let captured_type = if mv.is_en_passant() {
            PieceType::PAWN
        } else {
            PieceType::from(captured)
        };
        let mvv = if captured_type == PieceType::NONE {
            0
        } else {
            captured_type.mvv_bonus()
        };
        let promo_bonus = if mv.is_promotion() {
            mv.promotion_piece().see_bonus()
        } else {
            0
        };
        let attacker_type = PieceType::from(board.piece_on(mv.from()));
        let lva_penalty = Eval::try_from(attacker_type.to_index()).unwrap_or(0);
        scored_move.score = ScoredMove::WINNING_CAPTURE_SCORE + mvv + promo_bonus - lva_penalty;
    } else {
        let side = board.side_to_move();
        let from = mv.from();
        let to = mv.to();
        let moving_type = PieceType::from(board.piece_on(from));

        let mut score =
            NB_PIECE_TYPE - Eval::try_from(moving_type.to_index()).unwrap_or(NB_PIECE_TYPE);

        if let Some(attacker_type) = weakest_attacker(board, side, from) {
            if attacker_type.to_index() < moving_type.to_index()
                && !is_attacked_by(board, side, to, attacker_type)
            {
                score += threat_bonus(moving_type);
            }
        }

        score += histories.get_butterfly_score(side, from, to);

        let enemy_king_square = board.king_square_of(side.flip());
        if !(attacks_from(board, to, moving_type, side) & Bitboard::from(enemy_king_square)).is_empty() {
            score += 10_000;
        }

        if mv.is_promotion() {
            score -= 10_000;
        }

        scored_move.score = ScoredMove::QUIET_SCORE + score;
    }
}
