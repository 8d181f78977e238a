// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Multi-threaded integration tests for the page lock, pinning and swap failures
//! OWNERS: @kernel-mm-team
//! STATUS: Functional
//! TEST_COVERAGE: contention on a single frame, blocking while every frame is pinned, aborted faults
//!
//! TEST_SCENARIOS:
//!   - processes_thrash_one_frame_without_corruption(): two processes, one frame, data intact
//!   - threads_of_one_process_share_pages(): concurrent faults on the same page map it once
//!   - fault_blocks_until_a_pin_is_released(): all frames pinned -> fault sleeps -> unpin wakes it
//!   - random_pins_and_copies_keep_invariants(): seeded pin/write/read mix per thread, audit after every step
//!   - failed_swap_in_releases_the_frame(): backing-store read error aborts the fault cleanly
//!   - failed_swap_out_keeps_victim_resident(): backing-store write error leaves the victim mapped

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use nexus_vmm::{
    BackingStore, FrameOwner, MemBackingStore, ProcessLayout, SwapError, SwapSlot, VmConfig, VmError,
    VmKernel,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const PAGE: usize = 32;

fn config(frames: usize) -> VmConfig {
    VmConfig { page_size: PAGE, phys_pages: frames, tlb_size: 1, ..VmConfig::default() }
}

#[test]
fn processes_thrash_one_frame_without_corruption() {
    let kernel = VmKernel::new(config(1)).unwrap();
    let workers: Vec<_> = (0..2u8)
        .map(|id| {
            let process = kernel.spawn(ProcessLayout::anonymous(3));
            thread::spawn(move || {
                for round in 0..20u8 {
                    for vpn in 0..3 {
                        let tag = id.wrapping_mul(100).wrapping_add(round).wrapping_add(vpn as u8);
                        assert_eq!(process.write_virtual_memory(vpn * PAGE, &[tag; PAGE]).unwrap(), PAGE);
                    }
                    for vpn in 0..3 {
                        let tag = id.wrapping_mul(100).wrapping_add(round).wrapping_add(vpn as u8);
                        let mut page = [0u8; PAGE];
                        assert_eq!(process.read_virtual_memory(vpn * PAGE, &mut page).unwrap(), PAGE);
                        assert_eq!(page, [tag; PAGE], "process {id} vpn {vpn} round {round}");
                    }
                }
                process
            })
        })
        .collect();
    let processes: Vec<_> = workers.into_iter().map(|worker| worker.join().unwrap()).collect();
    kernel.audit().unwrap();
    assert!(kernel.stats().swap_outs > 0);
    for process in processes {
        process.unload().unwrap();
    }
    assert_eq!(kernel.free_frames(), 1);
    assert_eq!(kernel.swap_slots_in_use(), 0);
    kernel.audit().unwrap();
}

#[test]
fn threads_of_one_process_share_pages() {
    let kernel = VmKernel::new(config(2)).unwrap();
    let process = kernel.spawn(ProcessLayout::anonymous(4));
    let workers: Vec<_> = (0..4usize)
        .map(|id| {
            let process = process.clone();
            thread::spawn(move || {
                for _ in 0..50 {
                    let mut byte = [0u8; 1];
                    process.read_virtual_memory(id % 4 * PAGE, &mut byte).unwrap();
                    process.read_virtual_memory(0, &mut byte).unwrap();
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }
    kernel.audit().unwrap();
    assert!(process.resident_pages().unwrap() <= 2);
}

#[test]
fn fault_blocks_until_a_pin_is_released() {
    let kernel = VmKernel::new(config(2)).unwrap();
    let process = kernel.spawn(ProcessLayout::anonymous(4));
    process.write_virtual_memory(0, &[7; PAGE]).unwrap();
    let first = process.pin_page(0).unwrap();
    let second = process.pin_page(PAGE).unwrap();
    assert_eq!(kernel.free_frames(), 0);

    let faulting = {
        let process = process.clone();
        thread::spawn(move || {
            let mut byte = [0u8; 1];
            process.read_virtual_memory(2 * PAGE, &mut byte).unwrap()
        })
    };
    while kernel.frame_waiters() == 0 {
        thread::yield_now();
    }
    assert!(!faulting.is_finished());

    let victim = first.ppn();
    assert_eq!(first.contents(), vec![7; PAGE]);
    drop(first);
    assert_eq!(faulting.join().unwrap(), 1);
    assert!(kernel.stats().blocked_waits >= 1);
    assert_eq!(process.entry(2).unwrap().ppn, victim, "only the unpinned frame could be taken");
    assert!(process.entry(1).unwrap().valid());

    drop(second);
    let mut page = [0u8; PAGE];
    process.read_virtual_memory(0, &mut page).unwrap();
    assert_eq!(page, [7; PAGE]);
    kernel.audit().unwrap();
}

#[test]
fn random_pins_and_copies_keep_invariants() {
    const PAGES: usize = 3;
    let kernel = VmKernel::new(config(2)).unwrap();
    let workers: Vec<_> = (0..4u64)
        .map(|seed| {
            let process = kernel.spawn(ProcessLayout::anonymous(PAGES));
            let kernel = Arc::clone(&kernel);
            thread::spawn(move || {
                let mut rng = StdRng::seed_from_u64(seed);
                let mut shadow = [[0u8; PAGE]; PAGES];
                for step in 0..300 {
                    let vpn = rng.gen_range(0..PAGES);
                    match rng.gen_range(0..3) {
                        0 => {
                            let pinned = process.pin_page(vpn * PAGE).unwrap();
                            let owner = FrameOwner { pid: process.pid(), vpn };
                            assert_eq!(kernel.frame_owner(pinned.ppn()), Some(owner));
                            kernel.audit().unwrap_or_else(|err| panic!("step {step} (pinned): {err}"));
                            assert_eq!(pinned.contents(), shadow[vpn].to_vec());
                            assert_eq!(kernel.frame_owner(pinned.ppn()), Some(owner));
                        }
                        1 => {
                            let tag: u8 = rng.gen();
                            let written = process.write_virtual_memory(vpn * PAGE, &[tag; PAGE]).unwrap();
                            assert_eq!(written, PAGE);
                            shadow[vpn] = [tag; PAGE];
                        }
                        _ => {
                            let mut page = [0u8; PAGE];
                            assert_eq!(process.read_virtual_memory(vpn * PAGE, &mut page).unwrap(), PAGE);
                            assert_eq!(page, shadow[vpn], "seed {seed} step {step} vpn {vpn}");
                        }
                    }
                    kernel.audit().unwrap_or_else(|err| panic!("step {step}: {err}"));
                }
                process
            })
        })
        .collect();
    let processes: Vec<_> = workers.into_iter().map(|worker| worker.join().unwrap()).collect();
    assert!(kernel.stats().evictions > 0);
    for process in processes {
        process.unload().unwrap();
        kernel.audit().unwrap();
    }
    assert_eq!(kernel.free_frames(), 2);
    assert_eq!(kernel.swap_slots_in_use(), 0);
}

struct FlakyStore {
    inner: MemBackingStore,
    fail_reads: Arc<AtomicBool>,
    fail_writes: Arc<AtomicBool>,
}

impl FlakyStore {
    fn new() -> (Self, Arc<AtomicBool>, Arc<AtomicBool>) {
        let fail_reads = Arc::new(AtomicBool::new(false));
        let fail_writes = Arc::new(AtomicBool::new(false));
        let store = Self {
            inner: MemBackingStore::new(PAGE),
            fail_reads: Arc::clone(&fail_reads),
            fail_writes: Arc::clone(&fail_writes),
        };
        (store, fail_reads, fail_writes)
    }
}

impl BackingStore for FlakyStore {
    fn page_size(&self) -> usize {
        self.inner.page_size()
    }

    fn len_pages(&self) -> usize {
        self.inner.len_pages()
    }

    fn grow(&mut self) -> Result<SwapSlot, SwapError> {
        self.inner.grow()
    }

    fn read_page(&mut self, slot: SwapSlot, buf: &mut [u8]) -> Result<(), SwapError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(SwapError::ShortTransfer { slot, transferred: 0, expected: buf.len() });
        }
        self.inner.read_page(slot, buf)
    }

    fn write_page(&mut self, slot: SwapSlot, buf: &[u8]) -> Result<(), SwapError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(SwapError::Closed);
        }
        self.inner.write_page(slot, buf)
    }

    fn destroy(&mut self) -> Result<(), SwapError> {
        self.inner.destroy()
    }
}

#[test]
fn failed_swap_in_releases_the_frame() {
    let (store, fail_reads, _) = FlakyStore::new();
    let kernel = VmKernel::with_store(config(1), Box::new(store)).unwrap();
    let process = kernel.spawn(ProcessLayout::anonymous(2));
    process.write_virtual_memory(0, &[9; PAGE]).unwrap();
    process.write_virtual_memory(PAGE, &[8; PAGE]).unwrap();
    assert_eq!(process.swapped_pages().unwrap(), 1);

    fail_reads.store(true, Ordering::SeqCst);
    let mut page = [0u8; PAGE];
    let err = process.read_virtual_memory(0, &mut page).unwrap_err();
    assert!(matches!(err, VmError::Swap(SwapError::ShortTransfer { .. })));
    assert_eq!(kernel.free_frames(), 1, "aborted fault must hand its frame back");
    assert!(!process.entry(0).unwrap().valid());
    kernel.audit().unwrap();

    fail_reads.store(false, Ordering::SeqCst);
    assert_eq!(process.read_virtual_memory(0, &mut page).unwrap(), PAGE);
    assert_eq!(page, [9; PAGE]);
    process.read_virtual_memory(PAGE, &mut page).unwrap();
    assert_eq!(page, [8; PAGE]);
    kernel.audit().unwrap();
}

#[test]
fn failed_swap_out_keeps_victim_resident() {
    let (store, _, fail_writes) = FlakyStore::new();
    let kernel = VmKernel::with_store(config(1), Box::new(store)).unwrap();
    let process = kernel.spawn(ProcessLayout::anonymous(2));
    process.write_virtual_memory(0, &[9; PAGE]).unwrap();
    let resident = process.entry(0).unwrap();
    assert!(resident.valid() && resident.dirty());

    fail_writes.store(true, Ordering::SeqCst);
    let err = process.write_virtual_memory(PAGE, &[8; PAGE]).unwrap_err();
    assert!(matches!(err, VmError::Swap(SwapError::Closed)));
    assert_eq!(kernel.swap_slots_in_use(), 0, "slot of the failed write-back must be released");
    assert_eq!(kernel.stats().evictions, 0);
    let victim = process.entry(0).unwrap();
    assert!(victim.valid() && victim.dirty());
    assert_eq!(victim.ppn, resident.ppn);
    assert!(!process.entry(1).unwrap().valid());
    kernel.audit().unwrap();

    let mut page = [0u8; PAGE];
    assert_eq!(process.read_virtual_memory(0, &mut page).unwrap(), PAGE);
    assert_eq!(page, [9; PAGE]);

    fail_writes.store(false, Ordering::SeqCst);
    assert_eq!(process.write_virtual_memory(PAGE, &[8; PAGE]).unwrap(), PAGE);
    assert_eq!(process.swapped_pages().unwrap(), 1);
    process.read_virtual_memory(0, &mut page).unwrap();
    assert_eq!(page, [9; PAGE]);
    kernel.audit().unwrap();
}
