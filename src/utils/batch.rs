use std::future::Future;

use eyre::Result;
use futures_util::future::join_all;
use log::{info, warn};

/// Attempts after the first failure of a chunk
pub const MAX_RETRIES: usize = 3;

/// Runs `f` over `inputs`, `size` calls at a time. A chunk runs all its
/// calls concurrently and is retried as a whole when any of them fails.
/// Results keep the order of `inputs`.
///
/// # Errors
/// * The first error of a chunk that still fails after [`MAX_RETRIES`] retries
pub async fn batch<I, O, F, Fut>(inputs: &[I], size: usize, f: F, verbose: bool) -> Result<Vec<O>>
where
    F: Fn(&I) -> Fut,
    Fut: Future<Output = Result<O>>,
{
    let mut outputs = Vec::with_capacity(inputs.len());

    for (index, chunk) in inputs.chunks(size.max(1)).enumerate() {
        if verbose {
            info!("batch: item {} of {}", index * size.max(1), inputs.len());
        }

        let mut attempt = 0;
        let results = loop {
            let results: Result<Vec<O>> = join_all(chunk.iter().map(&f)).await.into_iter().collect();
            match results {
                Ok(results) => break results,
                Err(e) if attempt < MAX_RETRIES => {
                    warn!("batch: chunk {index} failed, retry {attempt}: {e}");
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        };
        outputs.extend(results);
    }

    Ok(outputs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use eyre::eyre;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_keeps_order() {
        let inputs: Vec<u64> = (0..25).collect();
        let outputs = batch(&inputs, 10, |&i| async move { Ok(i * 2) }, false).await.unwrap();
        assert_eq!(outputs, inputs.iter().map(|i| i * 2).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_retries_failing_chunk() {
        let calls = AtomicUsize::new(0);
        let outputs = batch(
            &[1u64, 2, 3],
            3,
            |i| {
                let call = calls.fetch_add(1, Ordering::SeqCst);
                let value = *i;
                async move {
                    // fails once, on the first call of the first attempt
                    if call == 0 {
                        Err(eyre!("flaky"))
                    } else {
                        Ok(value)
                    }
                }
            },
            false,
        )
        .await
        .unwrap();

        assert_eq!(outputs, vec![1, 2, 3]);
        assert_eq!(calls.load(Ordering::SeqCst), 6);
    }

    #[tokio::test]
    async fn test_gives_up_after_retries() {
        let calls = AtomicUsize::new(0);
        let result: Result<Vec<u64>> = batch(
            &[1u64],
            1,
            |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(eyre!("down")) }
            },
            false,
        )
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), MAX_RETRIES + 1);
    }
}
