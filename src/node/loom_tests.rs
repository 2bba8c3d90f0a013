//! Loom tests for the slot generation protocol.
//!
//! Run with: `RUSTFLAGS="--cfg loom" cargo test --lib node::loom_tests`
//!
//! Loom needs its own atomic types, so these tests model a slot with just
//! a generation and a key, plus one link that publishes it.

use loom::sync::Arc;
use loom::sync::atomic::{AtomicI64, AtomicU32, AtomicU64, Ordering, fence};
use loom::thread;

const NIL: u64 = u64::MAX;

struct LoomSlot {
    generation: AtomicU32,
    key: AtomicI64,
}

impl LoomSlot {
    fn vacant() -> Self {
        Self {
            generation: AtomicU32::new(1),
            key: AtomicI64::new(0),
        }
    }

    fn init(&self, key: i64) -> u32 {
        let vacant = self.generation.load(Ordering::Relaxed);
        self.key.store(key, Ordering::Relaxed);
        let live = vacant + 1;
        self.generation.store(live, Ordering::Release);
        live
    }

    fn retire(&self) {
        self.generation.fetch_add(1, Ordering::Relaxed);
        fence(Ordering::Release);
    }

    fn read(&self, generation: u32) -> Option<i64> {
        if self.generation.load(Ordering::Acquire) != generation {
            return None;
        }
        let key = self.key.load(Ordering::Acquire);
        fence(Ordering::Acquire);
        (self.generation.load(Ordering::Relaxed) == generation).then_some(key)
    }
}

/// A node published through a link is fully initialized when read.
#[test]
fn loom_publish_then_follow() {
    loom::model(|| {
        let slot = Arc::new(LoomSlot::vacant());
        let link = Arc::new(AtomicU64::new(NIL));

        let s1 = Arc::clone(&slot);
        let l1 = Arc::clone(&link);
        let writer = thread::spawn(move || {
            let generation = s1.init(42);
            l1.store(u64::from(generation), Ordering::Release);
        });

        let raw = link.load(Ordering::Acquire);
        if raw != NIL {
            #[expect(clippy::cast_possible_truncation)]
            let generation = raw as u32;
            assert_eq!(slot.read(generation), Some(42));
        }

        writer.join().unwrap();
    });
}

/// A reader racing retire + reuse sees either the old key or a stale handle.
#[test]
fn loom_reuse_never_leaks_new_key_to_old_handle() {
    loom::model(|| {
        let slot = Arc::new(LoomSlot::vacant());
        let old = slot.init(1);

        let s1 = Arc::clone(&slot);
        let recycler = thread::spawn(move || {
            s1.retire();
            s1.init(2);
        });

        match slot.read(old) {
            None | Some(1) => {}
            Some(other) => panic!("old handle observed key {other}"),
        }

        recycler.join().unwrap();
        assert_eq!(slot.read(old), None);
    });
}

/// Two retire/reuse cycles leave the slot with a distinct live generation.
#[test]
fn loom_generations_move_forward() {
    loom::model(|| {
        let slot = Arc::new(LoomSlot::vacant());
        let first = slot.init(7);

        let s1 = Arc::clone(&slot);
        let t1 = thread::spawn(move || {
            s1.retire();
            s1.init(8)
        });

        let second = t1.join().unwrap();
        assert_ne!(first, second);
        assert_eq!(second & 1, 0);
        assert_eq!(slot.read(second), Some(8));
    });
}
