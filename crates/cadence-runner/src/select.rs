use rand::Rng;
use tracing::info;

use cadence_core::{CadenceError, Ledger, SelectedSnapshot};

/// Uniformly pick one snapshot from the final ledger. The id comes back with whitespace
/// stripped so it can be passed straight to a restore.
pub fn select_snapshot<R: Rng + ?Sized>(ledger: &Ledger, rng: &mut R) -> Result<SelectedSnapshot, CadenceError> {
    if ledger.is_empty() {
        return Err(CadenceError::assertion("snapshot selection", "a non-empty ledger", 0));
    }
    let index = rng.gen_range(0..ledger.len());
    let id = ledger.records[index].id.normalized();
    info!(%id, index, of = ledger.len(), "selected snapshot");
    Ok(SelectedSnapshot { id, index, ledger_len: ledger.len() })
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_core::parse_ledger_lines;
    use rand::{rngs::StdRng, SeedableRng};

    fn ledger(n: usize) -> Ledger {
        let lines: Vec<String> =
            (0..n).map(|i| format!(" s-{i} ,2024-01-01 12:0{i}:00 +0000 UTC")).collect();
        parse_ledger_lines(&lines).unwrap()
    }

    #[test]
    fn same_seed_same_pick() {
        let l = ledger(6);
        let a = select_snapshot(&l, &mut StdRng::seed_from_u64(7)).unwrap();
        let b = select_snapshot(&l, &mut StdRng::seed_from_u64(7)).unwrap();
        assert_eq!(a.id, b.id);
        assert_eq!(a.ledger_len, 6);
        assert!(!a.id.as_str().contains(' '));
    }

    #[test]
    fn every_index_is_reachable() {
        let l = ledger(5);
        let mut rng = StdRng::seed_from_u64(1);
        let mut hits = [0usize; 5];
        for _ in 0..2000 {
            hits[select_snapshot(&l, &mut rng).unwrap().index] += 1;
        }
        assert!(hits.iter().all(|h| *h > 250), "skewed selection {hits:?}");
    }

    #[test]
    fn empty_ledger_is_an_assertion_failure() {
        let err = select_snapshot(&Ledger::default(), &mut StdRng::seed_from_u64(0)).unwrap_err();
        assert!(matches!(err, CadenceError::Assertion { .. }));
    }
}
