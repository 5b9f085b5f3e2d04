use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type UserId = i64;

/// How a secret recipient's label gets disguised before it is sent out.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ClueStrategy {
    Substring,
    Smudge,
    Scramble,
}

impl ClueStrategy {
    pub fn pick<R: Rng + ?Sized>(rng: &mut R) -> Self {
        match rng.gen_range(0..3) {
            0 => ClueStrategy::Substring,
            1 => ClueStrategy::Smudge,
            _ => ClueStrategy::Scramble,
        }
    }
}

/// Build a clue for `nickname` using a uniformly random strategy.
pub fn obfuscate<R: Rng + ?Sized>(nickname: &str, rng: &mut R) -> String {
    clue_with(ClueStrategy::pick(rng), nickname, rng)
}

/// Build a clue for `nickname` using a specific strategy.
///
/// Substring reveals a contiguous run of 3-4 characters, clamped to the
/// nickname length so short names never produce an out-of-range offset.
/// Smudge hides `round(0.7 * len)` positions behind `#`. Scramble emits a
/// random permutation. All three operate on `char` boundaries.
pub fn clue_with<R: Rng + ?Sized>(strategy: ClueStrategy, nickname: &str, rng: &mut R) -> String {
    let mut chars: Vec<char> = nickname.chars().collect();
    match strategy {
        ClueStrategy::Substring => {
            let run = rng.gen_range(3..=4usize).min(chars.len());
            let start = rng.gen_range(0..=chars.len() - run);
            let revealed: String = chars[start..start + run].iter().collect();
            format!(
                "Part of the label has been cut off! The remaining label contains: `{revealed}`"
            )
        }
        ClueStrategy::Smudge => {
            let hidden = (chars.len() as f64 * 0.7).round() as usize;
            for i in rand::seq::index::sample(rng, chars.len(), hidden) {
                chars[i] = '#';
            }
            let masked: String = chars.into_iter().collect();
            format!(
                "The label has smudges on it. You can only make out the following letters: `{masked}`"
            )
        }
        ClueStrategy::Scramble => {
            chars.shuffle(rng);
            let scrambled: String = chars.into_iter().collect();
            format!("Someone scrambled the letters on the label. It reads: `{scrambled}`")
        }
    }
}

/// Lowercase and strip all whitespace. Guesses match exactly or not at all.
pub fn normalize_guess(text: &str) -> String {
    text.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

pub fn guess_matches(guess: &str, nickname: &str) -> bool {
    normalize_guess(guess) == normalize_guess(nickname)
}

/// Where the label candidate came from, for validation error wording.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameSource {
    Custom,
    DisplayName,
}

impl NameSource {
    fn describe(self) -> &'static str {
        match self {
            NameSource::Custom => "custom name",
            NameSource::DisplayName => "display name",
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum NicknameError {
    #[error("Your {0} is too short. It needs to be at least 5 characters.")]
    TooShort(&'static str),
    #[error("Your {0} is too long. It needs to be under 25 characters.")]
    TooLong(&'static str),
    #[error("Please only use alphabetical characters in your {0}.")]
    NotAlphabetic(&'static str),
}

/// Check an event label. All violations are reported, not just the first.
pub fn validate_nickname(candidate: &str, source: NameSource) -> Vec<NicknameError> {
    let label = source.describe();
    let len = candidate.chars().count();
    let mut errors = Vec::new();
    if len < 5 {
        errors.push(NicknameError::TooShort(label));
    }
    if len > 25 {
        errors.push(NicknameError::TooLong(label));
    }
    if candidate.is_empty() || !candidate.chars().all(char::is_alphabetic) {
        errors.push(NicknameError::NotAlphabetic(label));
    }
    errors
}

/// Random confirmation phrase for destructive flows: `confirm NNNNNN`.
pub fn confirmation_token<R: Rng + ?Sized>(rng: &mut R) -> String {
    format!("confirm {:06}", rng.gen_range(0..1_000_000))
}

/// Verdict for a reply against a pending confirmation token.
///
/// `Ignored` replies leave the pending state live; the deadline timer is the
/// only other way out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmReply {
    Confirmed,
    Cancelled,
    Ignored,
}

pub fn classify_confirm_reply(reply: &str, token: &str) -> ConfirmReply {
    let reply = reply.trim().to_lowercase();
    if reply == token {
        ConfirmReply::Confirmed
    } else if reply == "cancel" {
        ConfirmReply::Cancelled
    } else {
        ConfirmReply::Ignored
    }
}

/// One participant's scores, as projected for leaderboard and roster views.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GifterSummary {
    pub user_id: UserId,
    pub nickname: String,
    pub gifts_sent: i64,
    pub gifts_received: i64,
}

/// Leaderboard order: gifts sent descending, ties broken by gifts received
/// descending, then nickname ascending.
pub fn rank_leaderboard(rows: &mut [GifterSummary]) {
    rows.sort_by(|a, b| {
        b.gifts_sent
            .cmp(&a.gifts_sent)
            .then(b.gifts_received.cmp(&a.gifts_received))
            .then_with(|| a.nickname.cmp(&b.nickname))
    });
}

/// Roster order: nickname ascending.
pub fn sort_roster(rows: &mut [GifterSummary]) {
    rows.sort_by(|a, b| a.nickname.cmp(&b.nickname));
}

/// Split display lines into fixed-size pages. An empty input yields no pages.
pub fn paginate<T: Clone>(rows: &[T], page_size: usize) -> Vec<Vec<T>> {
    rows.chunks(page_size.max(1)).map(|c| c.to_vec()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn rng(seed: u64) -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(seed)
    }

    fn backticked(clue: &str) -> String {
        let start = clue.find('`').unwrap() + 1;
        let end = clue.rfind('`').unwrap();
        clue[start..end].to_string()
    }

    #[test]
    fn substring_reveals_contiguous_run_of_three_or_four() {
        for seed in 0..64 {
            let clue = clue_with(ClueStrategy::Substring, "BlobSanta", &mut rng(seed));
            let run = backticked(&clue);
            assert!(run.len() == 3 || run.len() == 4, "bad run {run:?}");
            assert!("BlobSanta".contains(&run));
        }
    }

    #[test]
    fn substring_clamps_short_nicknames() {
        for seed in 0..16 {
            let clue = clue_with(ClueStrategy::Substring, "ab", &mut rng(seed));
            assert_eq!(backticked(&clue), "ab");
        }
        for seed in 0..16 {
            let clue = clue_with(ClueStrategy::Substring, "abc", &mut rng(seed));
            assert_eq!(backticked(&clue), "abc");
        }
    }

    #[test]
    fn smudge_preserves_length_and_hides_seventy_percent() {
        let name = "BlobSanta"; // 9 chars, round(6.3) = 6 hidden
        for seed in 0..64 {
            let clue = clue_with(ClueStrategy::Smudge, name, &mut rng(seed));
            let masked = backticked(&clue);
            assert_eq!(masked.chars().count(), 9);
            assert_eq!(masked.chars().filter(|&c| c == '#').count(), 6);
            for (original, shown) in name.chars().zip(masked.chars()) {
                assert!(shown == '#' || shown == original);
            }
        }
    }

    #[test]
    fn scramble_is_a_permutation() {
        for seed in 0..64 {
            let clue = clue_with(ClueStrategy::Scramble, "BlobSanta", &mut rng(seed));
            let mut shown: Vec<char> = backticked(&clue).chars().collect();
            let mut expected: Vec<char> = "BlobSanta".chars().collect();
            shown.sort_unstable();
            expected.sort_unstable();
            assert_eq!(shown, expected);
        }
    }

    #[test]
    fn strategy_pick_covers_all_three() {
        let mut seen = std::collections::HashSet::new();
        for seed in 0..64 {
            seen.insert(ClueStrategy::pick(&mut rng(seed)));
        }
        assert_eq!(seen.len(), 3);
    }

    #[test]
    fn guess_normalization_scenarios() {
        assert!(guess_matches("blob santa", "BlobSanta"));
        assert!(guess_matches("blobsanta ", "BlobSanta"));
        assert!(guess_matches("BLOB\tSANTA", "BlobSanta"));
        assert!(!guess_matches("BlobSant", "BlobSanta"));
    }

    #[test]
    fn nickname_validation() {
        assert!(validate_nickname("BlobSanta", NameSource::Custom).is_empty());
        assert_eq!(
            validate_nickname("Bob", NameSource::Custom),
            vec![NicknameError::TooShort("custom name")]
        );
        let long: String = std::iter::repeat('a').take(26).collect();
        assert_eq!(
            validate_nickname(&long, NameSource::Custom),
            vec![NicknameError::TooLong("custom name")]
        );
        assert_eq!(
            validate_nickname("xX_blob_Xx", NameSource::DisplayName),
            vec![NicknameError::NotAlphabetic("display name")]
        );
        // Everything wrong at once: short and non-alphabetic.
        assert_eq!(
            validate_nickname("a1", NameSource::Custom),
            vec![
                NicknameError::TooShort("custom name"),
                NicknameError::NotAlphabetic("custom name"),
            ]
        );
    }

    #[test]
    fn confirmation_token_format() {
        let token = confirmation_token(&mut rng(7));
        let digits = token.strip_prefix("confirm ").unwrap();
        assert_eq!(digits.len(), 6);
        assert!(digits.chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn confirm_reply_classification() {
        let token = "confirm 004217";
        assert_eq!(
            classify_confirm_reply("Confirm 004217", token),
            ConfirmReply::Confirmed
        );
        assert_eq!(
            classify_confirm_reply("  cancel ", token),
            ConfirmReply::Cancelled
        );
        assert_eq!(
            classify_confirm_reply("confirm 004218", token),
            ConfirmReply::Ignored
        );
        assert_eq!(classify_confirm_reply("what?", token), ConfirmReply::Ignored);
    }

    fn summary(nickname: &str, sent: i64, received: i64) -> GifterSummary {
        GifterSummary {
            user_id: 0,
            nickname: nickname.to_string(),
            gifts_sent: sent,
            gifts_received: received,
        }
    }

    #[test]
    fn leaderboard_breaks_ties_by_received_then_nickname() {
        let mut rows = vec![
            summary("carol", 2, 1),
            summary("alice", 5, 0),
            summary("erin", 2, 4),
            summary("bob", 2, 1),
        ];
        rank_leaderboard(&mut rows);
        let names: Vec<&str> = rows.iter().map(|r| r.nickname.as_str()).collect();
        assert_eq!(names, vec!["alice", "erin", "bob", "carol"]);
    }

    #[test]
    fn roster_sorts_by_nickname() {
        let mut rows = vec![summary("carol", 9, 0), summary("alice", 0, 9)];
        sort_roster(&mut rows);
        assert_eq!(rows[0].nickname, "alice");
    }

    #[test]
    fn pagination_chunks_fixed_size() {
        let lines: Vec<i32> = (0..50).collect();
        let pages = paginate(&lines, 24);
        assert_eq!(pages.len(), 3);
        assert_eq!(pages[0].len(), 24);
        assert_eq!(pages[2].len(), 2);
        assert!(paginate::<i32>(&[], 24).is_empty());
    }
}
