// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Property-based tests for user-memory copies under memory pressure
//! OWNERS: @kernel-mm-team
//! NOTE: Tests only; a flat byte vector is the reference model of each address space.
//!
//! TEST_SCOPE:
//!   - Reads always return the last bytes written, whatever was evicted in between
//!   - Copies that run off the end of the address space stop at its boundary
//!   - Kernel bookkeeping stays consistent after every operation
//!
//! TEST_SCENARIOS:
//!   - copies_match_reference_model(): random reads/writes/switches over two processes, 3 frames
//!   - transfers_clip_at_address_space_end(): copy length is min(len, space - vaddr)

use proptest::prelude::*;

use nexus_vmm::{ProcessLayout, VmConfig, VmKernel};

const PAGE: usize = 16;
const PAGES: usize = 6;
const SPACE: usize = PAGE * PAGES;

#[derive(Debug, Clone)]
enum Op {
    Write { proc: usize, vaddr: usize, data: Vec<u8> },
    Read { proc: usize, vaddr: usize, len: usize },
    Switch { proc: Option<usize> },
    Store { vaddr: usize },
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (0usize..2, 0..SPACE, prop::collection::vec(any::<u8>(), 1..3 * PAGE))
            .prop_map(|(proc, vaddr, data)| Op::Write { proc, vaddr, data }),
        4 => (0usize..2, 0..SPACE, 1usize..3 * PAGE).prop_map(|(proc, vaddr, len)| Op::Read { proc, vaddr, len }),
        1 => prop::option::of(0usize..2).prop_map(|proc| Op::Switch { proc }),
        1 => (0..SPACE).prop_map(|vaddr| Op::Store { vaddr }),
    ]
}

fn kernel(seed: u64) -> std::sync::Arc<VmKernel> {
    let config =
        VmConfig { page_size: PAGE, phys_pages: 3, tlb_size: 2, tlb_seed: seed, ..VmConfig::default() };
    VmKernel::new(config).unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn copies_match_reference_model(seed in any::<u64>(), ops in prop::collection::vec(arb_op(), 1..60)) {
        let kernel = kernel(seed);
        let processes = [
            kernel.spawn(ProcessLayout::anonymous(PAGES)),
            kernel.spawn(ProcessLayout::anonymous(PAGES)),
        ];
        let mut model = [vec![0u8; SPACE], vec![0u8; SPACE]];
        let mut current = None;

        for op in ops {
            match op {
                Op::Write { proc, vaddr, data } => {
                    let copied = processes[proc].write_virtual_memory(vaddr, &data).unwrap();
                    prop_assert_eq!(copied, data.len().min(SPACE - vaddr));
                    model[proc][vaddr..vaddr + copied].copy_from_slice(&data[..copied]);
                }
                Op::Read { proc, vaddr, len } => {
                    let mut buf = vec![0u8; len];
                    let copied = processes[proc].read_virtual_memory(vaddr, &mut buf).unwrap();
                    prop_assert_eq!(copied, len.min(SPACE - vaddr));
                    prop_assert_eq!(&buf[..copied], &model[proc][vaddr..vaddr + copied]);
                }
                Op::Switch { proc } => {
                    kernel.switch_to(proc.map(|index| processes[index].pid())).unwrap();
                    current = proc;
                }
                Op::Store { vaddr } => {
                    // Hardware stores only mark the page; the bytes stay as they were.
                    if let Some(index) = current {
                        processes[index].access(vaddr, true).unwrap();
                    }
                }
            }
            prop_assert!(kernel.audit().is_ok(), "{:?}", kernel.audit());
        }
    }

    #[test]
    fn transfers_clip_at_address_space_end(vaddr in 0..SPACE + PAGE, len in 0usize..4 * PAGE) {
        let kernel = kernel(0);
        let process = kernel.spawn(ProcessLayout::anonymous(PAGES));
        let expected = len.min(SPACE.saturating_sub(vaddr));
        prop_assert_eq!(process.write_virtual_memory(vaddr, &vec![1u8; len]).unwrap(), expected);
        let mut buf = vec![0u8; len];
        prop_assert_eq!(process.read_virtual_memory(vaddr, &mut buf).unwrap(), expected);
        prop_assert!(buf[..expected].iter().all(|b| *b == 1));
    }
}
