//! Freshness-seeking retry.
//!
//! Candidates are nominal times ordered newest first and already bounded by
//! the source's staleness window. Each is attempted in turn; `Ok(None)` is a
//! recoverable miss (not published, incomplete) and moves on to the next
//! older candidate. Reaching a candidate that is not newer than the last one
//! served means nothing new exists: that is `NoNewData`, never `Stale`.

use std::future::Future;

use tracing::debug;

use skycast_core::{FetchError, NominalTime};

pub async fn seek_freshest<T, F, Fut>(
    candidates: &[NominalTime],
    last_served: Option<NominalTime>,
    mut attempt: F,
) -> Result<(NominalTime, T), FetchError>
where
    F: FnMut(NominalTime) -> Fut,
    Fut: Future<Output = Result<Option<T>, FetchError>>,
{
    let (Some(newest), Some(oldest)) = (candidates.first(), candidates.last()) else {
        return Err(FetchError::stale("no candidates inside the staleness window"));
    };

    for &candidate in candidates {
        if let Some(last) = last_served {
            if candidate <= last {
                return Err(FetchError::NoNewData { since: last });
            }
        }
        match attempt(candidate).await? {
            Some(found) => return Ok((candidate, found)),
            None => debug!(candidate = %candidate, "candidate unavailable, falling back"),
        }
    }

    Err(FetchError::stale(format!(
        "{} candidate(s) from {newest} back to {oldest} unavailable",
        candidates.len()
    )))
}
