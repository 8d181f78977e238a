// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Executable-section descriptors and process address-space layout
//! OWNERS: @kernel-mm-team
//! PUBLIC API: ExecutableSection (trait), ImageSection, ProcessLayout, LayoutError
//! DEPENDS_ON: thiserror
//! INVARIANTS: Sections are contiguous from vpn 0; stack pages follow them; one argument page comes last
//!
//! Anything outside a section is demand-zero: the stack, the argument page
//! and every page of an anonymous layout.

use std::fmt;
use std::ops::Range;
use std::sync::Arc;

use thiserror::Error;

use crate::types::Vpn;

/// Loadable part of an executable image.
pub trait ExecutableSection: Send + Sync {
    /// First virtual page the section occupies.
    fn first_vpn(&self) -> Vpn;

    /// Number of pages the section occupies.
    fn page_count(&self) -> usize;

    /// Page size the section was laid out with.
    fn page_size(&self) -> usize;

    /// Whether user writes to the section must be refused.
    fn is_read_only(&self) -> bool;

    /// Fills `frame` with page `index` (relative to the section start).
    fn load_page(&self, index: usize, frame: &mut [u8]);

    /// Returns `true` when `vpn` falls inside the section.
    fn contains(&self, vpn: Vpn) -> bool {
        vpn >= self.first_vpn() && vpn < self.first_vpn() + self.page_count()
    }
}

/// Section whose on-disk image is held in memory.
#[derive(Clone)]
pub struct ImageSection {
    name: String,
    first_vpn: Vpn,
    page_size: usize,
    read_only: bool,
    image: Arc<[u8]>,
}

impl ImageSection {
    /// Creates a section covering `image` starting at `first_vpn`.
    ///
    /// The page count is `image.len()` rounded up to whole pages; the tail of
    /// the last page loads as zeroes.
    pub fn new(
        name: impl Into<String>,
        first_vpn: Vpn,
        page_size: usize,
        read_only: bool,
        image: impl Into<Arc<[u8]>>,
    ) -> Self {
        Self { name: name.into(), first_vpn, page_size, read_only, image: image.into() }
    }

    /// Section name, e.g. `.text`.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for ImageSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageSection")
            .field("name", &self.name)
            .field("first_vpn", &self.first_vpn)
            .field("pages", &self.page_count())
            .field("read_only", &self.read_only)
            .finish()
    }
}

impl ExecutableSection for ImageSection {
    fn first_vpn(&self) -> Vpn {
        self.first_vpn
    }

    fn page_count(&self) -> usize {
        self.image.len().div_ceil(self.page_size)
    }

    fn page_size(&self) -> usize {
        self.page_size
    }

    fn is_read_only(&self) -> bool {
        self.read_only
    }

    fn load_page(&self, index: usize, frame: &mut [u8]) {
        assert!(index < self.page_count(), "{}: page {index} beyond section", self.name);
        let start = index * self.page_size;
        let end = (start + self.page_size).min(self.image.len());
        let chunk = &self.image[start..end];
        frame[..chunk.len()].copy_from_slice(chunk);
        frame[chunk.len()..].fill(0);
    }
}

/// Rejected section arrangement.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LayoutError {
    /// A section does not start where the previous one ended.
    #[error("section starts at vpn {found}, expected {expected}")]
    Discontiguous {
        /// Next free page after the preceding sections.
        expected: Vpn,
        /// Where the offending section starts.
        found: Vpn,
    },
    /// A section was laid out for a different page size than the kernel uses.
    #[error("section uses {found}-byte pages, kernel uses {expected}")]
    PageSize {
        /// Kernel page size.
        expected: usize,
        /// Page size the section reports.
        found: usize,
    },
}

/// Shape of a process address space.
#[derive(Clone)]
pub struct ProcessLayout {
    sections: Vec<Arc<dyn ExecutableSection>>,
    stack: Range<Vpn>,
    argument_page: Option<Vpn>,
    page_count: usize,
}

impl ProcessLayout {
    /// Sections packed from vpn 0, then `stack_pages` of stack, then one
    /// argument page. Every section must use `page_size`-byte pages.
    pub fn from_sections(
        sections: Vec<Arc<dyn ExecutableSection>>,
        page_size: usize,
        stack_pages: usize,
    ) -> Result<Self, LayoutError> {
        let mut next = 0;
        for section in &sections {
            if section.page_size() != page_size {
                return Err(LayoutError::PageSize { expected: page_size, found: section.page_size() });
            }
            if section.first_vpn() != next {
                return Err(LayoutError::Discontiguous { expected: next, found: section.first_vpn() });
            }
            next += section.page_count();
        }
        let stack = next..next + stack_pages;
        let argument_page = stack.end;
        Ok(Self { sections, stack, argument_page: Some(argument_page), page_count: argument_page + 1 })
    }

    /// `pages` demand-zero pages with no executable image.
    pub fn anonymous(pages: usize) -> Self {
        Self { sections: Vec::new(), stack: 0..0, argument_page: None, page_count: pages }
    }

    /// Total number of virtual pages.
    pub fn page_count(&self) -> usize {
        self.page_count
    }

    /// Stack pages.
    pub fn stack(&self) -> Range<Vpn> {
        self.stack.clone()
    }

    /// Page holding argv, when the layout was built from an image.
    pub fn argument_page(&self) -> Option<Vpn> {
        self.argument_page
    }

    /// Section backing `vpn`, if any.
    pub fn section_for(&self, vpn: Vpn) -> Option<&Arc<dyn ExecutableSection>> {
        self.sections.iter().find(|section| section.contains(vpn))
    }
}

impl fmt::Debug for ProcessLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessLayout")
            .field("sections", &self.sections.len())
            .field("stack", &self.stack)
            .field("argument_page", &self.argument_page)
            .field("page_count", &self.page_count)
            .finish()
    }
}
