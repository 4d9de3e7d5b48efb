use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

use sync_hashtable::{Hashtable, TableError};

#[test]
fn table_is_send_and_sync() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<Hashtable<String, Vec<u8>>>();
}

#[test]
fn concurrent_mixed_ops_string_keys() {
    let m: Arc<Hashtable<String, usize>> = Arc::new(Hashtable::new());
    let n_threads = 6;
    let iters = 3_000;
    let barrier = Arc::new(Barrier::new(n_threads));

    let mut handles = Vec::new();
    for t in 0..n_threads {
        let b = barrier.clone();
        let map = m.clone();
        handles.push(thread::spawn(move || {
            b.wait();
            for i in 0..iters {
                let k = format!("k:{}:{}", t, i % 256);
                match i % 4 {
                    0 => {
                        map.put(k, i);
                    }
                    1 => {
                        let _ = map.get(&k);
                    }
                    2 => {
                        let _ = map.put_if_absent(k, i);
                    }
                    _ => {
                        let _ = map.remove(&k);
                    }
                }
            }
        }));
    }
    for h in handles {
        h.join().unwrap();
    }

    assert!(m.len() <= n_threads * 256);
    // Every surviving key is still reachable after all the growth.
    let keys: Vec<String> = m.keys().collect();
    assert_eq!(keys.len(), m.len());
    for k in keys {
        assert!(m.contains_key(&k));
    }
}

// Merge is one critical section, so no increment is lost.
#[test]
fn merge_counts_without_lost_updates() {
    let m: Arc<Hashtable<u32, u64>> = Arc::new(Hashtable::new());
    let n_threads = 8;
    let iters = 2_000;
    let barrier = Arc::new(Barrier::new(n_threads));

    let mut handles = Vec::new();
    for _ in 0..n_threads {
        let b = barrier.clone();
        let map = m.clone();
        handles.push(thread::spawn(move || {
            b.wait();
            for i in 0..iters {
                map.merge(i % 16, 1, |old, one| Some(old + one));
            }
        }));
    }
    for h in handles {
        h.join().unwrap();
    }

    let total: u64 = m.elements().sum();
    assert_eq!(total, (n_threads * iters as usize) as u64);
    for k in 0..16 {
        assert_eq!(m.get(&k), Some((n_threads * iters as usize / 16) as u64));
    }
}

// compute_if_absent runs its function at most once per key.
#[test]
fn compute_if_absent_initializes_once() {
    let m: Arc<Hashtable<u32, usize>> = Arc::new(Hashtable::new());
    let calls = Arc::new(AtomicUsize::new(0));
    let n_threads = 8;
    let barrier = Arc::new(Barrier::new(n_threads));

    let mut handles = Vec::new();
    for t in 0..n_threads {
        let b = barrier.clone();
        let map = m.clone();
        let calls = calls.clone();
        handles.push(thread::spawn(move || {
            b.wait();
            let mut seen = Vec::new();
            for k in 0..100 {
                let v = map.compute_if_absent(k, |_| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Some(t)
                });
                seen.push(v.unwrap());
            }
            seen
        }));
    }
    let results: Vec<Vec<usize>> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert_eq!(calls.load(Ordering::SeqCst), 100);
    for (k, winner) in results[0].iter().enumerate() {
        for r in &results {
            assert_eq!(r[k], *winner);
        }
        assert_eq!(m.get(&(k as u32)), Some(*winner));
    }
}

// Bulk traversal holds the lock, so a concurrent writer can never be
// observed halfway through.
#[test]
fn replace_all_is_not_interleaved() {
    let m: Arc<Hashtable<u32, u32>> = Arc::new((0..200).map(|i| (i, 0)).collect());
    let stop = Arc::new(std::sync::atomic::AtomicBool::new(false));

    let writer = {
        let map = m.clone();
        let stop = stop.clone();
        thread::spawn(move || {
            let mut round = 1;
            while !stop.load(Ordering::SeqCst) {
                map.replace_all(|_, _| round);
                round += 1;
            }
        })
    };

    for _ in 0..200 {
        let mut values = Vec::with_capacity(200);
        m.for_each(|_, v| values.push(*v));
        assert_eq!(values.len(), 200);
        assert!(values.windows(2).all(|w| w[0] == w[1]), "torn traversal");
    }
    stop.store(true, Ordering::SeqCst);
    writer.join().unwrap();
}

// A fail-fast iterator racing a writer either completes or reports the
// change; it never panics or yields a removed key twice.
#[test]
fn iterator_racing_a_writer_fails_fast() {
    let m: Arc<Hashtable<u32, u32>> = Arc::new((0..1_000).map(|i| (i, i)).collect());
    let barrier = Arc::new(Barrier::new(2));

    let writer = {
        let map = m.clone();
        let b = barrier.clone();
        thread::spawn(move || {
            b.wait();
            for i in 1_000..3_000 {
                map.put(i, i);
            }
        })
    };

    barrier.wait();
    let mut seen = std::collections::HashSet::new();
    let mut outcome = Ok(());
    for item in m.key_set().iter() {
        match item {
            Ok(k) => assert!(seen.insert(k), "key {k} yielded twice"),
            Err(e) => {
                outcome = Err(e);
                break;
            }
        }
    }
    writer.join().unwrap();

    match outcome {
        Ok(()) => assert!(seen.len() >= 1_000),
        Err(e) => assert_eq!(e, TableError::ConcurrentStructuralModification),
    }
    assert_eq!(m.len(), 3_000);
}
