/// Set of picked object ids backed by a bitset.
///
/// Iteration yields ids in ascending order, which keeps region picks
/// deterministic regardless of pixel scan order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionSet {
    words: Vec<u64>,
    len: usize,
}

impl SelectionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.words.clear();
        self.len = 0;
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn contains(&self, id: u32) -> bool {
        let (word, bit) = word_bit(id);
        self.words
            .get(word)
            .is_some_and(|w| (w & (1u64 << bit)) != 0)
    }

    /// Returns `true` if the set changed.
    pub fn insert(&mut self, id: u32) -> bool {
        let (word, bit) = word_bit(id);
        if self.words.len() <= word {
            self.words.resize(word + 1, 0);
        }
        let mask = 1u64 << bit;
        let w = &mut self.words[word];
        if (*w & mask) != 0 {
            return false;
        }
        *w |= mask;
        self.len += 1;
        true
    }

    pub fn remove(&mut self, id: u32) -> bool {
        let (word, bit) = word_bit(id);
        let Some(w) = self.words.get_mut(word) else {
            return false;
        };
        let mask = 1u64 << bit;
        if (*w & mask) == 0 {
            return false;
        }
        *w &= !mask;
        self.len -= 1;
        true
    }

    pub fn union_in_place(&mut self, other: &Self) {
        let max_words = other.words.len().max(self.words.len());
        self.words.resize(max_words, 0);
        for (idx, ow) in other.words.iter().copied().enumerate() {
            self.words[idx] |= ow;
        }
        self.len = self.words.iter().map(|w| w.count_ones() as usize).sum();
    }

    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        self.words.iter().enumerate().flat_map(|(wi, w)| {
            let mut word = *w;
            std::iter::from_fn(move || {
                if word == 0 {
                    return None;
                }
                let tz = word.trailing_zeros();
                word &= word - 1;
                Some(wi as u32 * 64 + tz)
            })
        })
    }

    pub fn to_vec(&self) -> Vec<u32> {
        self.iter().collect()
    }
}

impl FromIterator<u32> for SelectionSet {
    fn from_iter<I: IntoIterator<Item = u32>>(iter: I) -> Self {
        let mut s = Self::new();
        for id in iter {
            s.insert(id);
        }
        s
    }
}

fn word_bit(id: u32) -> (usize, u32) {
    ((id / 64) as usize, id % 64)
}

#[cfg(test)]
mod tests {
    use super::SelectionSet;

    #[test]
    fn dedups_and_iterates_ascending() {
        let s: SelectionSet = [130, 3, 64, 3, 0].into_iter().collect();
        assert_eq!(s.len(), 4);
        assert_eq!(s.to_vec(), vec![0, 3, 64, 130]);
        assert!(s.contains(64));
        assert!(!s.contains(65));
    }

    #[test]
    fn insert_remove_report_change() {
        let mut s = SelectionSet::new();
        assert!(s.insert(7));
        assert!(!s.insert(7));
        assert!(s.remove(7));
        assert!(!s.remove(7));
        assert!(!s.remove(1000));
        assert!(s.is_empty());
    }

    #[test]
    fn union_recounts() {
        let mut a: SelectionSet = [1, 2].into_iter().collect();
        let b: SelectionSet = [2, 200].into_iter().collect();
        a.union_in_place(&b);
        assert_eq!(a.to_vec(), vec![1, 2, 200]);
        assert_eq!(a.len(), 3);
    }
}
