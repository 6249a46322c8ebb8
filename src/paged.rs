//! Paged growable vector
//!
//! Setup tables (Groth16 coefficients, PLONK gates and addition records) can
//! run to hundreds of millions of entries. [`PagedVec`] stores them in fixed
//! pages of `2^page_bits` elements so growth never reallocates or copies
//! what is already stored; index `i` lives in page `i >> bits` at offset
//! `i & mask`.

#![forbid(unsafe_code)]

use crate::config;

/// Growable vector stored in fixed-size pages.
#[derive(Clone, Debug)]
pub struct PagedVec<T> {
    bits: u32,
    pages: Vec<Vec<T>>,
    len: usize,
}

impl<T> Default for PagedVec<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> PagedVec<T> {
    /// Page size from `ZKFORGE_PAGE_BITS`.
    pub fn new() -> Self {
        Self::with_page_bits(config::settings().page_bits)
    }

    pub fn with_page_bits(bits: u32) -> Self {
        Self { bits, pages: Vec::new(), len: 0 }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    fn locate(&self, i: usize) -> (usize, usize) {
        (i >> self.bits, i & ((1usize << self.bits) - 1))
    }

    pub fn push(&mut self, v: T) {
        let (page, _) = self.locate(self.len);
        if page == self.pages.len() {
            self.pages.push(Vec::with_capacity(1usize << self.bits));
        }
        self.pages[page].push(v);
        self.len += 1;
    }

    pub fn get(&self, i: usize) -> Option<&T> {
        if i >= self.len {
            return None;
        }
        let (p, o) = self.locate(i);
        self.pages[p].get(o)
    }

    pub fn get_mut(&mut self, i: usize) -> Option<&mut T> {
        if i >= self.len {
            return None;
        }
        let (p, o) = self.locate(i);
        self.pages[p].get_mut(o)
    }

    /// Overwrite element `i`; returns `false` when out of range.
    pub fn set(&mut self, i: usize, v: T) -> bool {
        match self.get_mut(i) {
            Some(slot) => {
                *slot = v;
                true
            }
            None => false,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        self.pages.iter().flat_map(|p| p.iter())
    }

    /// Number of allocated pages.
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }
}

impl<T> Extend<T> for PagedVec<T> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        for v in iter {
            self.push(v);
        }
    }
}

impl<T> std::ops::Index<usize> for PagedVec<T> {
    type Output = T;
    fn index(&self, i: usize) -> &T {
        match self.get(i) {
            Some(v) => v,
            None => panic!("PagedVec index {i} out of range (len {})", self.len),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crosses_page_boundaries() {
        let mut v = PagedVec::with_page_bits(4);
        v.extend(0..100u32);
        assert_eq!(v.len(), 100);
        assert_eq!(v.page_count(), 7);
        assert_eq!(v[15], 15);
        assert_eq!(v[16], 16);
        assert_eq!(v.get(100), None);
        assert!(v.set(33, 1000));
        assert!(!v.set(100, 0));
        assert_eq!(v[33], 1000);
        assert_eq!(v.iter().count(), 100);
        assert_eq!(v.iter().nth(99), Some(&99));
    }
}
