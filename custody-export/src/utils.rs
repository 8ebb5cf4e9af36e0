use std::future::Future;

/// Returns the first candidate, in order, for which `predicate` resolves to `true`.
///
/// Candidates after the first match are never evaluated.
pub async fn find_first<T, I, F, Fut>(candidates: I, mut predicate: F) -> Option<T>
where
    I: IntoIterator<Item = T>,
    T: Clone,
    F: FnMut(T) -> Fut,
    Fut: Future<Output = bool>,
{
    for candidate in candidates {
        if predicate(candidate.clone()).await {
            return Some(candidate);
        }
    }
    None
}
