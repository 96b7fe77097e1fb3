use crate::recovery::controller::{RecoveryAction, RecoveryContext, MAX_RETRIES};
use async_trait::async_trait;
use std::io::{self, BufRead, BufReader, Stdin, Stdout, Write};
use std::sync::{Arc, Mutex};

/// Decides what the recovery controller does next for a failed coordinate.
///
/// The controller enforces legality, so a policy may return anything; an
/// action outside [`RecoveryContext::legal`] is treated as abort. Other
/// coordinates keep resolving while `choose` is pending, so implementations
/// must not block the runtime.
#[async_trait]
pub trait RecoveryPolicy: Send + Sync {
    async fn choose(&self, context: &RecoveryContext<'_>) -> RecoveryAction;
}

/// Unattended policy: tries actions in a fixed preference order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AutoPolicy {
    /// Spend every retry first, then use a nearby cache file, then abort.
    #[default]
    RetryFirst,
    /// Use a nearby cache file when there is one, otherwise retry, then abort.
    FallbackFirst,
}

#[async_trait]
impl RecoveryPolicy for AutoPolicy {
    async fn choose(&self, context: &RecoveryContext<'_>) -> RecoveryAction {
        let preference = match self {
            AutoPolicy::RetryFirst => [RecoveryAction::Retry, RecoveryAction::NearestFallback],
            AutoPolicy::FallbackFirst => [RecoveryAction::NearestFallback, RecoveryAction::Retry],
        };
        preference
            .into_iter()
            .find(|action| context.is_legal(*action))
            .unwrap_or(RecoveryAction::Abort)
    }
}

/// Gives up on the first failure.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AbortPolicy;

#[async_trait]
impl RecoveryPolicy for AbortPolicy {
    async fn choose(&self, _context: &RecoveryContext<'_>) -> RecoveryAction {
        RecoveryAction::Abort
    }
}

/// Asks an operator through a numbered menu.
///
/// The menu is written and the answer read on tokio's blocking pool. Anything
/// other than a listed number, including end of input or an I/O error, aborts.
///
/// ```text
/// Primary data fetch failed for (33.45, -111.98): Request to https://... timed out
/// 1) Retry primary data fetch (3 of 3 retries left)
/// 2) Use nearest cache: nsrdb_33.54_-111.98_20240101.csv (10.0 km away)
/// 3) Abort
/// Choice:
/// ```
pub struct PromptPolicy<R, W> {
    io: Arc<Mutex<(R, W)>>,
}

impl PromptPolicy<BufReader<Stdin>, Stdout> {
    pub fn stdio() -> Self {
        Self::new(BufReader::new(io::stdin()), io::stdout())
    }
}

impl<R: BufRead, W: Write> PromptPolicy<R, W> {
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            io: Arc::new(Mutex::new((reader, writer))),
        }
    }

    /// Returns the reader and writer, e.g. to inspect what was shown.
    pub fn into_inner(self) -> Option<(R, W)> {
        Arc::try_unwrap(self.io).ok()?.into_inner().ok()
    }
}

#[async_trait]
impl<R, W> RecoveryPolicy for PromptPolicy<R, W>
where
    R: BufRead + Send + 'static,
    W: Write + Send + 'static,
{
    async fn choose(&self, context: &RecoveryContext<'_>) -> RecoveryAction {
        let menu = render_menu(context);
        let legal = context.legal.to_vec();
        let io = Arc::clone(&self.io);

        let answer = tokio::task::spawn_blocking(move || {
            let mut guard = io.lock().ok()?;
            let (reader, writer) = &mut *guard;
            writer.write_all(menu.as_bytes()).ok()?;
            writer.flush().ok()?;

            let mut line = String::new();
            match reader.read_line(&mut line) {
                Ok(0) | Err(_) => None,
                Ok(_) => Some(line),
            }
        })
        .await;

        answer
            .ok()
            .flatten()
            .and_then(|line| line.trim().parse::<usize>().ok())
            .and_then(|choice| choice.checked_sub(1))
            .and_then(|index| legal.get(index).copied())
            .unwrap_or(RecoveryAction::Abort)
    }
}

fn render_menu(context: &RecoveryContext<'_>) -> String {
    let mut menu = format!(
        "\nPrimary data fetch failed for {}: {}\n",
        context.coordinate, context.last_error
    );
    for (number, action) in context.legal.iter().enumerate() {
        let label = match action {
            RecoveryAction::Retry => format!(
                "Retry primary data fetch ({} of {MAX_RETRIES} retries left)",
                context.retries_left()
            ),
            RecoveryAction::NearestFallback => match context.nearest {
                Some(nearest) => format!(
                    "Use nearest cache: {} ({:.1} km away)",
                    nearest
                        .entry
                        .path
                        .file_name()
                        .map(|name| name.to_string_lossy().into_owned())
                        .unwrap_or_default(),
                    nearest.distance_km
                ),
                None => "Use nearest cache".to_string(),
            },
            RecoveryAction::Abort => "Abort".to_string(),
        };
        menu.push_str(&format!("{}) {label}\n", number + 1));
    }
    menu.push_str("Choice: ");
    menu
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::manager::{CacheEntry, NearbyEntry};
    use crate::sources::error::DataSourceError;
    use crate::types::coordinate::Coordinate;
    use chrono::NaiveDate;
    use reqwest::StatusCode;
    use std::io::Cursor;
    use std::path::PathBuf;

    const ALL: [RecoveryAction; 3] = [
        RecoveryAction::Retry,
        RecoveryAction::NearestFallback,
        RecoveryAction::Abort,
    ];
    const NO_CACHE: [RecoveryAction; 2] = [RecoveryAction::Retry, RecoveryAction::Abort];
    const EXHAUSTED: [RecoveryAction; 2] = [RecoveryAction::NearestFallback, RecoveryAction::Abort];

    fn error() -> DataSourceError {
        DataSourceError::HttpStatus {
            url: "https://nsrdb.test".to_string(),
            status: StatusCode::TOO_MANY_REQUESTS,
            body: String::new(),
        }
    }

    fn nearby() -> NearbyEntry {
        NearbyEntry {
            entry: CacheEntry {
                coordinate: Coordinate::new(33.54, -111.98).unwrap(),
                fetch_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
                path: PathBuf::from("/data/climate/nsrdb_33.54_-111.98_20240101.csv"),
            },
            distance_km: 10.0,
        }
    }

    fn context<'a>(
        error: &'a DataSourceError,
        nearest: Option<&'a NearbyEntry>,
        legal: &'a [RecoveryAction],
        attempts: u32,
    ) -> RecoveryContext<'a> {
        RecoveryContext {
            coordinate: Coordinate::new(33.45, -111.98).unwrap(),
            attempts,
            last_error: error,
            nearest,
            legal,
        }
    }

    #[tokio::test]
    async fn test_auto_policy_preferences() {
        let error = error();
        let nearest = nearby();

        let full = context(&error, Some(&nearest), &ALL, 0);
        assert_eq!(AutoPolicy::RetryFirst.choose(&full).await, RecoveryAction::Retry);
        assert_eq!(
            AutoPolicy::FallbackFirst.choose(&full).await,
            RecoveryAction::NearestFallback
        );

        let no_cache = context(&error, None, &NO_CACHE, 1);
        assert_eq!(
            AutoPolicy::FallbackFirst.choose(&no_cache).await,
            RecoveryAction::Retry
        );

        let exhausted = context(&error, Some(&nearest), &EXHAUSTED, MAX_RETRIES);
        assert_eq!(
            AutoPolicy::RetryFirst.choose(&exhausted).await,
            RecoveryAction::NearestFallback
        );

        let only_abort = context(&error, None, &[RecoveryAction::Abort], MAX_RETRIES);
        assert_eq!(AutoPolicy::default().choose(&only_abort).await, RecoveryAction::Abort);
        assert_eq!(AbortPolicy.choose(&full).await, RecoveryAction::Abort);
    }

    #[tokio::test]
    async fn test_prompt_maps_numbers_to_legal_actions() {
        let error = error();
        let nearest = nearby();
        let full = context(&error, Some(&nearest), &ALL, 1);

        let cases = [
            ("1\n", RecoveryAction::Retry),
            ("2\n", RecoveryAction::NearestFallback),
            (" 3 \n", RecoveryAction::Abort),
            ("4\n", RecoveryAction::Abort),
            ("0\n", RecoveryAction::Abort),
            ("retry\n", RecoveryAction::Abort),
            ("", RecoveryAction::Abort),
        ];
        for (input, expected) in cases {
            let policy = PromptPolicy::new(Cursor::new(input.as_bytes().to_vec()), Vec::new());
            assert_eq!(policy.choose(&full).await, expected, "input {input:?}");
        }

        // Without a nearby file the second entry is abort.
        let no_cache = context(&error, None, &NO_CACHE, 0);
        let policy = PromptPolicy::new(Cursor::new(b"2\n".to_vec()), Vec::new());
        assert_eq!(policy.choose(&no_cache).await, RecoveryAction::Abort);
    }

    #[tokio::test]
    async fn test_prompt_menu_text() {
        let error = error();
        let nearest = nearby();
        let full = context(&error, Some(&nearest), &ALL, 1);

        let policy = PromptPolicy::new(Cursor::new(b"1\n".to_vec()), Vec::new());
        policy.choose(&full).await;
        let (_, output) = policy.into_inner().unwrap();
        let output = String::from_utf8(output).unwrap();

        assert!(output.contains("Primary data fetch failed for (33.45, -111.98)"));
        assert!(output.contains("1) Retry primary data fetch (2 of 3 retries left)"));
        assert!(output
            .contains("2) Use nearest cache: nsrdb_33.54_-111.98_20240101.csv (10.0 km away)"));
        assert!(output.contains("3) Abort"));
        assert!(output.ends_with("Choice: "));
    }
}
