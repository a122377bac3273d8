use rayon::prelude::*;

/// Splits `data` into one chunk per CPU, maps every chunk with `f` on the rayon pool and yields
/// the results in completion order.
pub(crate) fn par_chunks<T, F, R>(data: &[T], f: F) -> impl Iterator<Item = R>
where
    T: Sync,
    R: Send,
    F: Fn(&[T]) -> Vec<R> + Sync,
{
    let (s, r) = crossbeam_channel::unbounded();
    let nr_cpus = num_cpus::get();
    let nr_elems = data.len();
    let chunk_size = std::cmp::max(nr_elems / nr_cpus, 1);
    data.chunks(chunk_size)
        .par_bridge()
        .for_each_with(s, |s, chunk| {
            // The receiver is alive until every sender is dropped.
            let _ = s.send(f(chunk));
        });
    r.into_iter().flat_map(|v| v.into_iter())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn par_chunks_visits_everything() {
        let data = (0..1000).collect::<Vec<u64>>();
        let mut out = par_chunks(&data, |chunk| chunk.iter().map(|x| x * 2).collect())
            .collect::<Vec<_>>();
        out.sort_unstable();
        assert_eq!(out, data.iter().map(|x| x * 2).collect::<Vec<_>>());
    }

    #[test]
    fn par_chunks_empty_input() {
        let data: Vec<u64> = Vec::new();
        assert_eq!(par_chunks(&data, |chunk| chunk.to_vec()).count(), 0);
    }
}
