//! End-to-end scenarios against a fully wired engine: disk manager,
//! buffer pool, record files, lock manager, and transaction manager
//! working over a real temporary directory.

use std::sync::Arc;

use parking_lot::RwLock;
use silt::{
    AbortReason, BufferPoolManager, DiskManager, GroupLockMode, LockDataId, LockManager,
    LogManager, Record, RmManager, RmScan, Rid, SharedFileHandle, SiltError, TableRegistry,
    TransactionManager, TransactionState, WriteRecord, NO_PAGE,
};
use tempfile::TempDir;

// 8 * (4096 - 8) / (1 + 8 * 1360) = 3 records per page.
const WIDE: i32 = 1360;

struct Engine {
    _dir: TempDir,
    rm: RmManager,
    log: LogManager,
    registry: Arc<TableRegistry>,
    tm: TransactionManager,
}

impl Engine {
    fn open() -> Self {
        let dir = TempDir::new().unwrap();
        let disk = Arc::new(DiskManager::new());
        let pool = BufferPoolManager::new(32, Arc::clone(&disk));
        let rm = RmManager::new(disk, pool);
        let log = LogManager::open(&dir.path().join("silt.log")).unwrap();
        let registry = Arc::new(TableRegistry::new());
        let tm = TransactionManager::new(Arc::new(LockManager::new()), Arc::clone(&registry));
        Self {
            _dir: dir,
            rm,
            log,
            registry,
            tm,
        }
    }

    fn create_table(&self, name: &str, record_size: i32) -> SharedFileHandle {
        let path = self._dir.path().join(format!("{name}.rm"));
        self.rm.create_file(&path, record_size).unwrap();
        let fh = Arc::new(RwLock::new(self.rm.open_file(&path).unwrap()));
        self.registry.register(name, Arc::clone(&fh));
        fh
    }
}

fn rec(record_size: i32, byte: u8) -> Vec<u8> {
    vec![byte; record_size as usize]
}

#[test]
fn test_basic_crud() {
    let engine = Engine::open();
    let table = engine.create_table("crud", 8);
    let mut fh = table.write();

    let rid1 = fh.insert_record(b"AAAAAAAA").unwrap();
    let rid2 = fh.insert_record(b"BBBBBBBB").unwrap();
    assert_eq!(rid1, Rid::new(1, 0));
    assert_eq!(rid2, Rid::new(1, 1));

    assert_eq!(fh.get_record(rid1).unwrap().data(), b"AAAAAAAA");
    fh.update_record(rid1, b"CCCCCCCC").unwrap();
    assert_eq!(fh.get_record(rid1).unwrap().data(), b"CCCCCCCC");

    fh.delete_record(rid2).unwrap();
    assert!(matches!(
        fh.get_record(rid2),
        Err(SiltError::RecordNotFound {
            page_no: 1,
            slot_no: 1
        })
    ));
}

#[test]
fn test_page_full_transition_and_free_list() {
    let engine = Engine::open();
    let table = engine.create_table("pages", WIDE);
    let mut fh = table.write();

    // Fill page 1 exactly.
    for i in 0..3_u8 {
        let rid = fh.insert_record(&rec(WIDE, i)).unwrap();
        assert_eq!(rid, Rid::new(1, i32::from(i)));
    }
    assert_eq!(fh.file_hdr().first_free_page_no, NO_PAGE);
    assert_eq!(
        fh.fetch_page_handle(1).unwrap().page_hdr().next_free_page_no,
        NO_PAGE
    );

    // The fourth insert allocates page 2.
    assert_eq!(fh.insert_record(&rec(WIDE, 9)).unwrap(), Rid::new(2, 0));
    assert_eq!(fh.file_hdr().first_free_page_no, 2);
    assert_eq!(
        fh.fetch_page_handle(2).unwrap().page_hdr().next_free_page_no,
        NO_PAGE
    );

    // Deleting from the full page threads it back in at the head.
    fh.delete_record(Rid::new(1, 1)).unwrap();
    assert_eq!(fh.file_hdr().first_free_page_no, 1);
    assert_eq!(
        fh.fetch_page_handle(1).unwrap().page_hdr().next_free_page_no,
        2
    );
}

#[test]
fn test_forward_scan_skips_holes() {
    let engine = Engine::open();
    let table = engine.create_table("scan", WIDE);
    let mut fh = table.write();
    for i in 0..4_u8 {
        fh.insert_record(&rec(WIDE, i)).unwrap();
    }
    fh.delete_record(Rid::new(1, 1)).unwrap();

    let mut scan = RmScan::new(&fh).unwrap();
    let mut seen = Vec::new();
    while !scan.is_end() {
        seen.push(scan.rid());
        scan.next().unwrap();
    }
    assert_eq!(seen, vec![Rid::new(1, 0), Rid::new(1, 2), Rid::new(2, 0)]);
}

#[test]
fn test_lock_upgrade_success() {
    let engine = Engine::open();
    let table = engine.create_table("locks", 8);
    let fd = table.read().fd();
    let lm = engine.tm.lock_manager();

    let txn = engine.tm.begin(None, &engine.log);
    let rid = Rid::new(1, 0);
    assert!(lm.lock_is_on_table(&txn, fd).unwrap());
    assert!(lm.lock_shared_on_record(&txn, rid, fd).unwrap());
    assert!(lm.lock_exclusive_on_record(&txn, rid, fd).unwrap());
    assert_eq!(
        lm.group_lock_mode(LockDataId::record(fd, rid)),
        Some(GroupLockMode::Exclusive)
    );
    engine.tm.commit(&txn, &engine.log);
}

#[test]
fn test_lock_upgrade_conflict() {
    let engine = Engine::open();
    let table = engine.create_table("locks", 8);
    let fd = table.read().fd();
    let lm = engine.tm.lock_manager();

    let t1 = engine.tm.begin(None, &engine.log);
    let t2 = engine.tm.begin(None, &engine.log);
    let rid = Rid::new(1, 0);
    assert!(lm.lock_shared_on_record(&t1, rid, fd).unwrap());
    assert!(lm.lock_shared_on_record(&t2, rid, fd).unwrap());

    let err = lm.lock_exclusive_on_record(&t1, rid, fd).unwrap_err();
    assert!(matches!(
        err,
        SiltError::TransactionAbort {
            reason: AbortReason::UpgradeConflict,
            ..
        }
    ));
    // The prescribed reaction: abort the upgrading transaction.
    engine.tm.abort(&t1, &engine.log).unwrap();
    assert_eq!(t1.state(), TransactionState::Aborted);
    // t2 can now upgrade.
    assert!(lm.lock_exclusive_on_record(&t2, rid, fd).unwrap());
    engine.tm.commit(&t2, &engine.log);
}

#[test]
fn test_strict_two_phase_locking() {
    let engine = Engine::open();
    let table = engine.create_table("locks", 8);
    let fd = table.read().fd();
    let lm = engine.tm.lock_manager();

    let txn = engine.tm.begin(None, &engine.log);
    let r1 = Rid::new(1, 0);
    let r2 = Rid::new(1, 1);
    assert!(lm.lock_shared_on_record(&txn, r1, fd).unwrap());
    assert!(lm.unlock(&txn, LockDataId::record(fd, r1)));
    assert_eq!(txn.state(), TransactionState::Shrinking);

    let err = lm.lock_shared_on_record(&txn, r2, fd).unwrap_err();
    assert!(matches!(
        err,
        SiltError::TransactionAbort {
            reason: AbortReason::LockOnShrinking,
            ..
        }
    ));
    engine.tm.abort(&txn, &engine.log).unwrap();
}

#[test]
fn test_abort_restores_file_state_bit_for_bit() {
    let engine = Engine::open();
    let table = engine.create_table("undo", 8);

    // Pre-transaction state: one committed record.
    let keeper = table.write().insert_record(b"KEEPKEEP").unwrap();
    let hdr_before = *table.read().file_hdr();

    let txn = engine.tm.begin(None, &engine.log);
    {
        let mut fh = table.write();
        let rid = fh.insert_record(b"AAAAAAAA").unwrap();
        txn.append_write_record(WriteRecord::Insert {
            table: "undo".into(),
            rid,
        });
        let pre = fh.get_record(rid).unwrap();
        fh.update_record(rid, b"A'A'A'A'").unwrap();
        txn.append_write_record(WriteRecord::Update {
            table: "undo".into(),
            rid,
            old_record: pre,
        });
        let image = fh.get_record(rid).unwrap();
        fh.delete_record(rid).unwrap();
        txn.append_write_record(WriteRecord::Delete {
            table: "undo".into(),
            rid,
            record: image,
        });
    }
    engine.tm.abort(&txn, &engine.log).unwrap();

    let fh = table.read();
    assert_eq!(*fh.file_hdr(), hdr_before);
    assert_eq!(fh.get_record(keeper).unwrap().data(), b"KEEPKEEP");

    // Only the keeper is visible to a scan.
    let mut scan = RmScan::new(&fh).unwrap();
    assert_eq!(scan.rid(), keeper);
    scan.next().unwrap();
    assert!(scan.is_end());
}

#[test]
fn test_committed_writes_survive_reopen() {
    let engine = Engine::open();
    let path = engine._dir.path().join("durable.rm");
    engine.rm.create_file(&path, 8).unwrap();

    let rid = {
        let mut fh = engine.rm.open_file(&path).unwrap();
        let txn = engine.tm.begin(None, &engine.log);
        let rid = fh.insert_record(b"DURABLE!").unwrap();
        txn.append_write_record(WriteRecord::Insert {
            table: "durable".into(),
            rid,
        });
        engine.tm.commit(&txn, &engine.log);
        engine.rm.close_file(fh).unwrap();
        rid
    };

    let fh = engine.rm.open_file(&path).unwrap();
    assert_eq!(fh.get_record(rid).unwrap().data(), b"DURABLE!");
    engine.rm.close_file(fh).unwrap();
}

#[test]
fn test_reader_writer_record_locking_protocol() {
    // Two transactions follow the intention-lock protocol on different
    // records of one table: IX + X on record for the writer, IS + S on
    // record for the reader. None of the pairs conflict.
    let engine = Engine::open();
    let table = engine.create_table("proto", 8);
    let fd = table.read().fd();
    let lm = engine.tm.lock_manager();

    let (rid_a, rid_b) = {
        let mut fh = table.write();
        (
            fh.insert_record(b"AAAAAAAA").unwrap(),
            fh.insert_record(b"BBBBBBBB").unwrap(),
        )
    };

    let writer = engine.tm.begin(None, &engine.log);
    let reader = engine.tm.begin(None, &engine.log);

    assert!(lm.lock_ix_on_table(&writer, fd).unwrap());
    assert!(lm.lock_exclusive_on_record(&writer, rid_a, fd).unwrap());
    assert!(lm.lock_is_on_table(&reader, fd).unwrap());
    assert!(lm.lock_shared_on_record(&reader, rid_b, fd).unwrap());

    // The reader cannot touch the writer's record...
    assert!(!lm.lock_shared_on_record(&reader, rid_a, fd).unwrap());
    // ...and a third transaction cannot take the table exclusively.
    let third = engine.tm.begin(None, &engine.log);
    assert!(!lm.lock_exclusive_on_table(&third, fd).unwrap());

    {
        let mut fh = table.write();
        let pre = fh.get_record(rid_a).unwrap();
        fh.update_record(rid_a, b"aaaaaaaa").unwrap();
        writer.append_write_record(WriteRecord::Update {
            table: "proto".into(),
            rid: rid_a,
            old_record: pre,
        });
    }
    assert_eq!(table.read().get_record(rid_b).unwrap().data(), b"BBBBBBBB");

    engine.tm.commit(&writer, &engine.log);
    engine.tm.commit(&reader, &engine.log);
    engine.tm.commit(&third, &engine.log);

    assert_eq!(table.read().get_record(rid_a).unwrap().data(), b"aaaaaaaa");
    assert_eq!(lm.group_lock_mode(LockDataId::table(fd)), None);
}

#[test]
fn test_insert_delete_insert_reuses_state() {
    let engine = Engine::open();
    let table = engine.create_table("reuse", 8);
    let mut fh = table.write();

    let rid = fh.insert_record(b"XXXXXXXX").unwrap();
    let hdr_after_first = *fh.file_hdr();
    fh.delete_record(rid).unwrap();
    let rid2 = fh.insert_record(b"XXXXXXXX").unwrap();

    assert_eq!(rid2, rid);
    assert_eq!(*fh.file_hdr(), hdr_after_first);
}

#[test]
fn test_undo_record_images_round_trip_through_write_set() {
    // The pre-image captured in a write record is an owned copy:
    // mutating the file afterwards must not corrupt the undo data.
    let engine = Engine::open();
    let table = engine.create_table("images", 8);
    let rid = table.write().insert_record(b"ORIGINAL").unwrap();

    let txn = engine.tm.begin(None, &engine.log);
    let pre: Record = table.read().get_record(rid).unwrap();
    table.write().update_record(rid, b"SCRIBBLE").unwrap();
    txn.append_write_record(WriteRecord::Update {
        table: "images".into(),
        rid,
        old_record: pre,
    });
    table.write().update_record(rid, b"SCRIBBL2").unwrap();

    engine.tm.abort(&txn, &engine.log).unwrap();
    assert_eq!(table.read().get_record(rid).unwrap().data(), b"ORIGINAL");
}
