/// State of a single arena slot.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Entry<T> {
    /// Allocated index without contents.
    Vacant,
    Occupied(T),
    /// Released index, kept to detect further access.
    Tombstone,
}

/// Append-only slot arena.
///
/// Indices are never reused: a released slot becomes a [`Entry::Tombstone`]
/// and stays one, so stale handles can always be told apart from live ones.
#[derive(Debug, Clone)]
pub struct Storage<T> {
    data: Vec<Entry<T>>,
    /// Number of occupied slots.
    real_size: usize,
}

impl<T> Default for Storage<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Storage<T> {
    pub fn new() -> Self {
        Self {
            data: Vec::new(),
            real_size: 0,
        }
    }

    /// Number of allocated indices, in any state.
    pub fn size(&self) -> usize {
        self.data.len()
    }
    pub fn real_size(&self) -> usize {
        self.real_size
    }

    pub fn entry(&self, index: usize) -> &Entry<T> {
        &self.data[index]
    }
    pub fn is_occupied(&self, index: usize) -> bool {
        matches!(self.data.get(index), Some(Entry::Occupied(_)))
    }
    pub fn is_tombstone(&self, index: usize) -> bool {
        matches!(self.data.get(index), Some(Entry::Tombstone))
    }
    pub fn value(&self, index: usize) -> Option<&T> {
        match self.data.get(index) {
            Some(Entry::Occupied(value)) => Some(value),
            _ => None,
        }
    }
    pub fn value_mut(&mut self, index: usize) -> Option<&mut T> {
        match self.data.get_mut(index) {
            Some(Entry::Occupied(value)) => Some(value),
            _ => None,
        }
    }

    /// Allocate a fresh vacant index.
    pub fn alloc(&mut self) -> usize {
        self.data.push(Entry::Vacant);
        self.data.len() - 1
    }

    pub fn add(&mut self, value: T) -> usize {
        let index = self.alloc();
        self.put(index, value);
        index
    }

    /// Fill a vacant index.
    pub fn put(&mut self, index: usize, value: T) {
        assert!(
            matches!(self.data[index], Entry::Vacant),
            "Index {} is not vacant",
            index
        );
        self.data[index] = Entry::Occupied(value);
        self.real_size += 1;
    }

    /// Empty an occupied index, returning its contents. The index becomes vacant.
    pub fn take(&mut self, index: usize) -> Option<T> {
        match std::mem::replace(&mut self.data[index], Entry::Vacant) {
            Entry::Occupied(value) => {
                self.real_size -= 1;
                Some(value)
            }
            other => {
                self.data[index] = other;
                None
            }
        }
    }

    /// Release an index, turning it into a tombstone.
    pub fn drop(&mut self, index: usize) -> Option<T> {
        let old = std::mem::replace(&mut self.data[index], Entry::Tombstone);
        match old {
            Entry::Occupied(value) => {
                self.real_size -= 1;
                Some(value)
            }
            _ => None,
        }
    }

    /// Forget a tombstone or contents entirely; the index becomes vacant again.
    pub fn clear(&mut self, index: usize) {
        if let Entry::Occupied(_) = self.data[index] {
            self.real_size -= 1;
        }
        self.data[index] = Entry::Vacant;
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &T)> {
        self.data.iter().enumerate().filter_map(|(i, e)| match e {
            Entry::Occupied(value) => Some((i, value)),
            _ => None,
        })
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (usize, &mut T)> {
        self.data.iter_mut().enumerate().filter_map(|(i, e)| match e {
            Entry::Occupied(value) => Some((i, value)),
            _ => None,
        })
    }
}
