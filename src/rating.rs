//! Elo-style rating update applied after every scored match.

use crate::store::{RESULT_BOT1, RESULT_BOT2, RESULT_DRAW};

const K: f64 = 40.0;

fn expectation(a: i64, b: i64) -> f64 {
    1.0 / (1.0 + 10f64.powf((a - b) as f64 / 400.0))
}

/// Compute the post-match scores for both sides.
///
/// Deltas truncate toward zero when converted to integers. Result codes
/// outside {draw, bot1, bot2} leave the scores untouched.
pub fn new_scores(score1: i64, score2: i64, result: i32) -> (i64, i64) {
    match result {
        RESULT_DRAW => (
            score1 + (K * (0.5 - expectation(score2, score1))) as i64,
            score2 + (K * (0.5 - expectation(score1, score2))) as i64,
        ),
        RESULT_BOT1 => (
            score1 + (K * (1.0 - expectation(score2, score1))) as i64,
            score2 - (K * expectation(score1, score2)) as i64,
        ),
        RESULT_BOT2 => (
            score1 - (K * expectation(score2, score1)) as i64,
            score2 + (K * (1.0 - expectation(score1, score2))) as i64,
        ),
        _ => (score1, score2),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::RESULT_ERROR;

    #[test]
    fn equal_scores_win_moves_twenty_points() {
        assert_eq!(new_scores(400, 400, RESULT_BOT1), (420, 380));
        assert_eq!(new_scores(400, 400, RESULT_BOT2), (380, 420));
    }

    #[test]
    fn equal_scores_draw_changes_nothing() {
        assert_eq!(new_scores(400, 400, RESULT_DRAW), (400, 400));
    }

    #[test]
    fn draw_moves_at_most_twenty_points() {
        for (s1, s2) in [(400, 800), (800, 400), (0, 1200), (555, 545)] {
            let (n1, n2) = new_scores(s1, s2, RESULT_DRAW);
            assert!((n1 - s1).abs() <= 20, "{s1} vs {s2} gave {n1}");
            assert!((n2 - s2).abs() <= 20, "{s1} vs {s2} gave {n2}");
        }
    }

    #[test]
    fn winner_never_loses_points() {
        for (s1, s2) in [(400, 400), (200, 900), (900, 200), (400, 410)] {
            let (n1, n2) = new_scores(s1, s2, RESULT_BOT1);
            assert!(n1 >= s1);
            assert!(n2 <= s2);

            let (n1, n2) = new_scores(s1, s2, RESULT_BOT2);
            assert!(n1 <= s1);
            assert!(n2 >= s2);
        }
    }

    #[test]
    fn underdog_win_pays_more() {
        let (up, _) = new_scores(200, 900, RESULT_BOT1);
        let (fav, _) = new_scores(900, 200, RESULT_BOT1);
        assert!(up - 200 > fav - 900);
    }

    #[test]
    fn error_result_is_a_no_op() {
        assert_eq!(new_scores(512, 384, RESULT_ERROR), (512, 384));
        assert_eq!(new_scores(512, 384, 42), (512, 384));
    }
}
