//! Sparse PVM memory (Gray Paper equation 770-802): a 4 GiB byte-addressable space
//! backed by a two-level page directory so that an untouched 4 GiB address range
//! costs nothing but a handful of empty top-level slots.
//!
//! Top level: `PAGE_GROUPS` slots, each covering `PAGES_PER_GROUP` pages. A group's
//! page vector is allocated only when a page inside it is first touched. This mirrors
//! `ram.rs`'s region-layout math (heap/stack/args/ro placement) but replaces its flat
//! `HashMap<u32, Vec<u8>>` with a directory indexed by `(group, page-in-group)`.

use crate::config::{self, align_to_page, align_to_zone};
use crate::types::{FaultCheckResult, MemoryAccessType, Ram, ReadResult, WriteResult};

/// Pages per top-level group. `PAGE_GROUPS * PAGES_PER_GROUP * PAGE_SIZE == 2^32`.
const PAGES_PER_GROUP: u32 = 1024;
const PAGE_GROUPS: u32 = 1024;

struct PageGroup {
    /// `None` until the first page in this group is touched.
    pages: Option<Box<[Option<Box<[u8; config::PAGE_SIZE as usize]>>]>>,
    access: Option<Box<[MemoryAccessType]>>,
}

impl PageGroup {
    fn empty() -> Self {
        Self {
            pages: None,
            access: None,
        }
    }

    fn pages_mut(&mut self) -> &mut [Option<Box<[u8; config::PAGE_SIZE as usize]>>] {
        self.pages
            .get_or_insert_with(|| vec![None; PAGES_PER_GROUP as usize].into_boxed_slice())
    }

    fn access_mut(&mut self) -> &mut [MemoryAccessType] {
        self.access.get_or_insert_with(|| {
            vec![MemoryAccessType::None; PAGES_PER_GROUP as usize].into_boxed_slice()
        })
    }

    fn access_of(&self, page_in_group: u32) -> MemoryAccessType {
        self.access
            .as_ref()
            .map_or(MemoryAccessType::None, |a| a[page_in_group as usize])
    }

    fn page_of(&self, page_in_group: u32) -> Option<&[u8; config::PAGE_SIZE as usize]> {
        self.pages
            .as_ref()
            .and_then(|p| p[page_in_group as usize].as_deref())
    }
}

/// Sparse memory over the PVM's 4 GiB address space.
pub struct SparseMemory {
    groups: Vec<PageGroup>,
    argument_data_address: u32,
    stack_address_end: u32,
    stack_address: u32,
    heap_start_address: u32,
    heap_end_address: u32,
    ro_data_address_end: u32,
    current_heap_pointer: u32,
    argument_data_end: u32,
    last_load_address: u32,
    last_load_value: u64,
    last_store_address: u32,
    last_store_value: u64,
    /// Single-page pointer cache amortizing repeated in-page accesses (Design Notes §9).
    cache_page_index: Option<u32>,
}

impl Default for SparseMemory {
    fn default() -> Self {
        let mut groups = Vec::with_capacity(PAGE_GROUPS as usize);
        for _ in 0..PAGE_GROUPS {
            groups.push(PageGroup::empty());
        }
        Self {
            groups,
            argument_data_address: config::ARGS_SEGMENT_START,
            stack_address_end: config::STACK_SEGMENT_END,
            stack_address: 0,
            heap_start_address: 0,
            heap_end_address: 0,
            ro_data_address_end: 0,
            current_heap_pointer: 0,
            argument_data_end: 0,
            last_load_address: 0,
            last_load_value: 0,
            last_store_address: 0,
            last_store_value: 0,
            cache_page_index: None,
        }
    }
}

impl SparseMemory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn split(address: u32) -> (u32, u32, u32) {
        let page_index = address / config::PAGE_SIZE;
        (
            page_index / PAGES_PER_GROUP,
            page_index % PAGES_PER_GROUP,
            address % config::PAGE_SIZE,
        )
    }

    fn group_mut(&mut self, group: u32) -> &mut PageGroup {
        &mut self.groups[group as usize]
    }

    fn group(&self, group: u32) -> &PageGroup {
        &self.groups[group as usize]
    }

    fn ensure_page(&mut self, group: u32, page_in_group: u32) -> &mut [u8; config::PAGE_SIZE as usize] {
        let g = self.group_mut(group);
        g.pages_mut()[page_in_group as usize]
            .get_or_insert_with(|| Box::new([0u8; config::PAGE_SIZE as usize]))
    }

    fn access_at(&self, address: u32) -> MemoryAccessType {
        let (group, page_in_group, _) = Self::split(address);
        self.group(group).access_of(page_in_group)
    }

    fn page_index(address: u32) -> u32 {
        address / config::PAGE_SIZE
    }
}

impl Ram for SparseMemory {
    fn read_octets(&mut self, address: u32, count: u32) -> ReadResult {
        let check = self.is_readable_with_fault(address, count);
        if !check.success {
            return ReadResult::new(None, check.fault_address);
        }
        let mut result = vec![0u8; count as usize];
        let mut filled = 0usize;
        let mut current_addr = address;
        let end_addr = address + count;

        while current_addr < end_addr {
            let (group, page_in_group, offset) = Self::split(current_addr);
            let bytes_in_page = (count as usize - filled).min(config::PAGE_SIZE as usize - offset as usize);
            let page_end = offset as usize + bytes_in_page;
            match self.group(group).page_of(page_in_group) {
                Some(page) => result[filled..filled + bytes_in_page]
                    .copy_from_slice(&page[offset as usize..page_end]),
                None => {
                    // Zeroed but mapped (access tag says readable): leave the slice at zero.
                }
            }
            filled += bytes_in_page;
            current_addr += bytes_in_page as u32;
        }

        self.cache_page_index = Some(Self::page_index(address));
        self.last_load_address = address;
        self.last_load_value = result
            .iter()
            .take(8)
            .enumerate()
            .fold(0u64, |acc, (i, &b)| acc | (u64::from(b) << (i * 8)));
        ReadResult::new(Some(result), 0)
    }

    fn write_octets(&mut self, address: u32, values: &[u8]) -> WriteResult {
        let size = values.len() as u32;
        let check = self.is_writable_with_fault(address, size);
        if !check.success {
            return WriteResult::new(
                true,
                if check.fault_address != 0 {
                    check.fault_address
                } else {
                    0xFFFF_FFFF
                },
            );
        }
        let mut written = 0usize;
        let mut current_addr = address;
        let end_addr = address + size;

        while current_addr < end_addr {
            let (group, page_in_group, offset) = Self::split(current_addr);
            let bytes_in_page =
                (values.len() - written).min(config::PAGE_SIZE as usize - offset as usize);
            let page_end = offset as usize + bytes_in_page;
            let page = self.ensure_page(group, page_in_group);
            page[offset as usize..page_end].copy_from_slice(&values[written..written + bytes_in_page]);
            written += bytes_in_page;
            current_addr += bytes_in_page as u32;
        }

        self.cache_page_index = Some(Self::page_index(address));
        self.last_store_address = address;
        self.last_store_value = values
            .iter()
            .take(8)
            .enumerate()
            .fold(0u64, |acc, (i, &b)| acc | (u64::from(b) << (i * 8)));
        WriteResult::new(false, 0)
    }

    fn current_heap_pointer(&self) -> u32 {
        self.current_heap_pointer
    }

    fn set_current_heap_pointer(&mut self, value: u32) {
        self.current_heap_pointer = value;
    }

    fn allocate_pages(&mut self, start_page: u32, count: u32) {
        let end_page = start_page + count;
        for page_index in start_page..end_page {
            let (group, page_in_group) = (page_index / PAGES_PER_GROUP, page_index % PAGES_PER_GROUP);
            self.ensure_page(group, page_in_group);
            self.group_mut(group).access_mut()[page_in_group as usize] = MemoryAccessType::Write;
        }
        let end_address = end_page * config::PAGE_SIZE;
        if end_address > self.current_heap_pointer {
            self.current_heap_pointer = end_address;
        }
    }

    fn is_readable_with_fault(&self, address: u32, size: u32) -> FaultCheckResult {
        if size == 0 {
            return FaultCheckResult::new(true, 0);
        }
        let end_address = address + size;
        let start_page = Self::page_index(address);
        let end_page = Self::page_index(end_address.saturating_sub(1));
        for page_index in start_page..=end_page {
            let access = self.access_at(page_index * config::PAGE_SIZE);
            if access == MemoryAccessType::None {
                return FaultCheckResult::new(false, page_index * config::PAGE_SIZE);
            }
        }
        FaultCheckResult::new(true, 0)
    }

    fn is_writable_with_fault(&self, address: u32, size: u32) -> FaultCheckResult {
        if size == 0 {
            return FaultCheckResult::new(true, 0);
        }
        let end_address = address + size;
        let start_page = Self::page_index(address);
        let end_page = Self::page_index(end_address.saturating_sub(1));
        for page_index in start_page..=end_page {
            let access = self.access_at(page_index * config::PAGE_SIZE);
            if access != MemoryAccessType::Write {
                return FaultCheckResult::new(false, page_index * config::PAGE_SIZE);
            }
        }
        FaultCheckResult::new(true, 0)
    }

    fn initialize_memory_layout(
        &mut self,
        argument_data: &[u8],
        read_only_data: &[u8],
        read_write_data: &[u8],
        stack_size: u32,
        heap_zero_padding_size: u32,
    ) {
        let ro_len = read_only_data.len() as u32;
        let heap_size = read_write_data.len() as u32;
        let args_len = argument_data.len() as u32;

        let heap_start = 2 * config::ZONE_SIZE + align_to_zone(ro_len);
        let heap_end = heap_start + align_to_page(heap_size);
        let heap_zeros_end = heap_end + heap_zero_padding_size * config::PAGE_SIZE;

        let args_start = self.argument_data_address;
        let args_end = args_start + align_to_page(args_len);
        let args_zero_padding_end = args_end + align_to_page(args_len);

        let stack_end = self.stack_address_end;
        let stack_start = stack_end - align_to_page(stack_size);

        let ro_start = config::ZONE_SIZE;
        let ro_end = ro_start + align_to_page(ro_len);

        if !argument_data.is_empty() {
            self.write_octets_during_initialization(args_start, argument_data);
        }
        if !read_only_data.is_empty() {
            self.write_octets_during_initialization(ro_start, read_only_data);
        }
        if !read_write_data.is_empty() {
            self.write_octets_during_initialization(heap_start, read_write_data);
        }

        self.argument_data_end = args_zero_padding_end;
        self.ro_data_address_end = ro_end;
        self.stack_address = stack_start;
        self.heap_start_address = heap_start;
        self.heap_end_address = heap_end;
        self.current_heap_pointer = heap_zeros_end;

        if ro_len > 0 {
            self.init_page(ro_start, ro_end - ro_start, MemoryAccessType::Read);
        }
        if args_len > 0 {
            self.init_page(args_start, args_zero_padding_end - args_start, MemoryAccessType::Read);
        }
        if stack_start < stack_end {
            self.init_page(stack_start, stack_end - stack_start, MemoryAccessType::Write);
        }
        if heap_size > 0 {
            self.init_page(heap_start, heap_end - heap_start, MemoryAccessType::Write);
        }
        if heap_end < heap_zeros_end {
            self.init_page(heap_end, heap_zeros_end - heap_end, MemoryAccessType::Write);
        }
    }

    fn set_page_access_rights(&mut self, address: u32, length: u32, access_type: MemoryAccessType) {
        if length == 0 {
            return;
        }
        let start_page = Self::page_index(address);
        let end_page = Self::page_index(address + length - 1);
        for page_index in start_page..=end_page {
            let (group, page_in_group) = (page_index / PAGES_PER_GROUP, page_index % PAGES_PER_GROUP);
            self.group_mut(group).access_mut()[page_in_group as usize] = access_type;
        }
    }

    fn init_page(&mut self, address: u32, length: u32, access_type: MemoryAccessType) {
        if length == 0 {
            return;
        }
        let start_page = Self::page_index(address);
        let end_page = Self::page_index(address + length - 1);
        for page_index in start_page..=end_page {
            let (group, page_in_group) = (page_index / PAGES_PER_GROUP, page_index % PAGES_PER_GROUP);
            self.ensure_page(group, page_in_group);
            self.group_mut(group).access_mut()[page_in_group as usize] = access_type;
        }
    }

    fn write_octets_during_initialization(&mut self, address: u32, values: &[u8]) {
        let mut written = 0usize;
        let mut current_addr = address;
        let end_addr = address + values.len() as u32;
        while current_addr < end_addr {
            let (group, page_in_group, offset) = Self::split(current_addr);
            let bytes_in_page =
                (values.len() - written).min(config::PAGE_SIZE as usize - offset as usize);
            let page_end = offset as usize + bytes_in_page;
            let page = self.ensure_page(group, page_in_group);
            page[offset as usize..page_end].copy_from_slice(&values[written..written + bytes_in_page]);
            written += bytes_in_page;
            current_addr += bytes_in_page as u32;
        }
    }

    fn get_page_dump(&self, page_index: u32) -> Vec<u8> {
        let (group, page_in_group) = (page_index / PAGES_PER_GROUP, page_index % PAGES_PER_GROUP);
        self.group(group)
            .page_of(page_in_group)
            .map_or_else(|| vec![0u8; config::PAGE_SIZE as usize], |p| p.to_vec())
    }

    fn reset(&mut self) {
        for g in &mut self.groups {
            g.pages = None;
            g.access = None;
        }
        self.stack_address = 0;
        self.heap_start_address = 0;
        self.heap_end_address = 0;
        self.ro_data_address_end = 0;
        self.current_heap_pointer = 0;
        self.argument_data_end = 0;
        self.last_load_address = 0;
        self.last_load_value = 0;
        self.last_store_address = 0;
        self.last_store_value = 0;
        self.cache_page_index = None;
    }

    fn last_load_address(&self) -> u32 {
        self.last_load_address
    }

    fn last_load_value(&self) -> u64 {
        self.last_load_value
    }

    fn last_store_address(&self) -> u32 {
        self.last_store_address
    }

    fn last_store_value(&self) -> u64 {
        self.last_store_value
    }

    fn clear_last_memory_op(&mut self) {
        self.last_load_address = 0;
        self.last_load_value = 0;
        self.last_store_address = 0;
        self.last_store_value = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unmapped_read_faults() {
        let mem = SparseMemory::new();
        let check = mem.is_readable_with_fault(0x1_0000, 4);
        assert!(!check.success);
    }

    #[test]
    fn write_then_read_round_trips() {
        let mut mem = SparseMemory::new();
        mem.init_page(0x2_0000, config::PAGE_SIZE, MemoryAccessType::Write);
        let w = mem.write_octets(0x2_0000, &[1, 2, 3, 4]);
        assert!(!w.has_fault);
        let r = mem.read_octets(0x2_0000, 4);
        assert_eq!(r.data.unwrap(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn cross_group_access_is_lazy() {
        let mut mem = SparseMemory::new();
        // A page far away from the origin must not force earlier groups to allocate.
        let far = (PAGES_PER_GROUP * 500) * config::PAGE_SIZE;
        mem.init_page(far, config::PAGE_SIZE, MemoryAccessType::Write);
        assert!(mem.groups[0].pages.is_none());
    }
}
