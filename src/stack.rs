use crate::error::Error;

/// A last-in-first-out store with bounded, incremental growth.
///
/// The stack starts with room for `size` items. A push onto a full stack
/// grows the capacity by `increment`, never past `max_size`; once the
/// maximum is reached further pushes fail with [`Error::OutOfSpace`]
/// instead of reallocating. Both the automaton compiler and the matchers
/// keep their work lists here so that pathological patterns or inputs end
/// in a reported error rather than unbounded memory use.
#[derive(Debug)]
pub struct Stack<T> {
    items: Vec<T>,
    capacity: usize,
    max_size: usize,
    increment: usize,
    growths: usize,
}

impl<T> Stack<T> {
    pub fn new(size: usize, max_size: usize, increment: usize) -> Stack<T> {
        let capacity = size.min(max_size);
        Stack {
            items: Vec::with_capacity(capacity),
            capacity,
            max_size,
            increment: increment.max(1),
            growths: 0,
        }
    }

    pub fn push(&mut self, value: T) -> Result<(), Error> {
        if self.items.len() == self.capacity {
            self.grow()?;
        }
        self.items.push(value);
        Ok(())
    }

    fn grow(&mut self) -> Result<(), Error> {
        if self.capacity >= self.max_size {
            log::trace!("stack: full at {} items", self.capacity);
            return Err(Error::OutOfSpace("stack reached its maximum size"));
        }
        let new_capacity = self.capacity.saturating_add(self.increment).min(self.max_size);
        self.items
            .try_reserve_exact(new_capacity - self.items.len())
            .map_err(|_| Error::OutOfSpace("stack allocation failed"))?;
        log::trace!("stack: grew from {} to {} items", self.capacity, new_capacity);
        self.capacity = new_capacity;
        self.growths += 1;
        Ok(())
    }

    /// Pops the topmost item, `None` once the stack is empty.
    pub fn pop(&mut self) -> Option<T> {
        self.items.pop()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Drops every item but keeps the capacity reached so far.
    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Number of times the capacity has been raised since creation.
    pub fn growth_count(&self) -> usize {
        self.growths
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn fill(stack: &mut Stack<usize>, n: usize) -> Result<(), Error> {
        for i in 0..n {
            stack.push(i)?;
        }
        Ok(())
    }

    #[test]
    fn test_stack_lifo_order() {
        let mut stack = Stack::new(2, 8, 2);
        fill(&mut stack, 5).unwrap();
        assert_eq!(stack.len(), 5);
        assert_eq!(stack.pop(), Some(4));
        assert_eq!(stack.pop(), Some(3));
        stack.push(9).unwrap();
        assert_eq!(stack.pop(), Some(9));
        assert_eq!(stack.pop(), Some(2));
        assert_eq!(stack.pop(), Some(1));
        assert_eq!(stack.pop(), Some(0));
        assert_eq!(stack.pop(), None);
        assert!(stack.is_empty());
    }

    #[test]
    fn test_stack_push_fails_at_max() {
        let mut stack = Stack::new(4, 10, 3);
        fill(&mut stack, 10).unwrap();
        assert_eq!(stack.capacity(), 10);
        assert_eq!(
            stack.push(10),
            Err(Error::OutOfSpace("stack reached its maximum size"))
        );
        // a failed push leaves the contents untouched
        assert_eq!(stack.len(), 10);
        assert_eq!(stack.pop(), Some(9));
    }

    #[test]
    fn test_stack_growth_law() {
        let shapes = [(4usize, 10usize, 3usize), (0, 7, 2), (1, 20, 1), (5, 11, 4), (3, 3, 5)];
        for &(size, max, inc) in &shapes {
            for n in 0..=max + 2 {
                let mut stack = Stack::new(size, max, inc);
                let ok = fill(&mut stack, n).is_ok();
                assert_eq!(ok, n <= max, "size={} max={} inc={} n={}", size, max, inc, n);
                if ok {
                    let expected = if n > size { (n - size + inc - 1) / inc } else { 0 };
                    let shape = format!("size={} max={} inc={} n={}", size, max, inc, n);
                    assert_eq!(stack.growth_count(), expected, "{}", shape);
                    assert!(stack.len() <= stack.capacity());
                    assert!(stack.capacity() <= stack.max_size());
                }
            }
        }
    }

    #[test]
    fn test_stack_clear_keeps_capacity() {
        let mut stack = Stack::new(1, 16, 4);
        fill(&mut stack, 6).unwrap();
        let capacity = stack.capacity();
        stack.clear();
        assert!(stack.is_empty());
        assert_eq!(stack.capacity(), capacity);
        fill(&mut stack, 6).unwrap();
        assert_eq!(stack.growth_count(), 2);
    }
}
