// Startup prompts - run in cooked mode, before the key reader owns stdin

use anyhow::{bail, Result};
use rand::seq::SliceRandom;
use rand::Rng;
use std::io::{self, BufRead, Write};

/// Print `label` and read one line from stdin, without the trailing newline.
pub fn read_line(label: &str) -> Result<String> {
    let mut stdout = io::stdout();
    write!(stdout, "{}", label)?;
    stdout.flush()?;

    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

/// Blank input means "surprise me".
pub fn pick_query<R: Rng>(input: &str, keywords: &[String], rng: &mut R) -> Result<(String, bool)> {
    let input = input.trim();
    if !input.is_empty() {
        return Ok((input.to_string(), false));
    }
    match keywords.choose(rng) {
        Some(keyword) => Ok((keyword.clone(), true)),
        None => bail!("no query given and no random keywords configured"),
    }
}

/// 1-based selection; blank picks a random track. Returns a 0-based index.
pub fn pick_track<R: Rng>(input: &str, count: usize, rng: &mut R) -> Result<usize> {
    if count == 0 {
        bail!("no tracks to choose from");
    }

    let input = input.trim();
    if input.is_empty() {
        return Ok(rng.gen_range(0..count));
    }

    match input.parse::<usize>() {
        Ok(n) if (1..=count).contains(&n) => Ok(n - 1),
        _ => bail!("invalid track number '{}', expected 1-{}", input, count),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_pick_query() {
        let mut rng = StdRng::seed_from_u64(7);
        let keywords = vec!["lofi".to_string(), "ambient".to_string()];

        let (query, random) = pick_query("  night drive ", &keywords, &mut rng).unwrap();
        assert_eq!(query, "night drive");
        assert!(!random);

        let (query, random) = pick_query("   ", &keywords, &mut rng).unwrap();
        assert!(keywords.contains(&query));
        assert!(random);

        assert!(pick_query("", &[], &mut rng).is_err());
    }

    #[test]
    fn test_pick_track() {
        let mut rng = StdRng::seed_from_u64(7);

        assert_eq!(pick_track("1", 5, &mut rng).unwrap(), 0);
        assert_eq!(pick_track(" 5 ", 5, &mut rng).unwrap(), 4);
        assert!(pick_track("0", 5, &mut rng).is_err());
        assert!(pick_track("6", 5, &mut rng).is_err());
        assert!(pick_track("two", 5, &mut rng).is_err());
        assert!(pick_track("", 0, &mut rng).is_err());

        for _ in 0..20 {
            assert!(pick_track("", 3, &mut rng).unwrap() < 3);
        }
    }
}
