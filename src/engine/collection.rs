// ABOUTME: Ordered containers that reject duplicate names among siblings
// ABOUTME: Backs the task list of a job and the job list of a workflow

use std::ops::Deref;
use std::slice;

use super::context::TaskContext;
use super::error::{EngineError, Result};
use super::job::Job;
use super::task::Task;

/// Anything stored in a [`UniqueList`].
pub trait Named {
    /// Element kind used in error messages.
    const KIND: &'static str;

    fn name(&self) -> &str;
}

impl Named for Task {
    const KIND: &'static str = "task";

    fn name(&self) -> &str {
        Task::name(self)
    }
}

impl Named for Job {
    const KIND: &'static str = "job";

    fn name(&self) -> &str {
        Job::name(self)
    }
}

/// Ordered sequence in which no two elements share a name.
///
/// Every mutating operation validates first and leaves the list untouched
/// on error.
#[derive(Debug)]
pub struct UniqueList<T> {
    items: Vec<T>,
}

pub type TaskList = UniqueList<Task>;
pub type JobList = UniqueList<Job>;

impl<T: Named> UniqueList<T> {
    pub fn new() -> Self {
        Self { items: Vec::new() }
    }

    pub fn from_items<I>(items: I) -> Result<Self>
    where
        I: IntoIterator<Item = T>,
    {
        let mut list = Self::new();
        list.extend(items)?;
        Ok(list)
    }

    pub fn push(&mut self, item: T) -> Result<()> {
        self.ensure_unique(item.name(), None)?;
        self.items.push(item);
        Ok(())
    }

    pub fn insert(&mut self, index: usize, item: T) -> Result<()> {
        if index > self.items.len() {
            return Err(self.out_of_range(index));
        }
        self.ensure_unique(item.name(), None)?;
        self.items.insert(index, item);
        Ok(())
    }

    /// Replace the element at `index`, returning the previous one.
    ///
    /// The replacement may reuse the name of the element it replaces.
    pub fn replace(&mut self, index: usize, item: T) -> Result<T> {
        if index >= self.items.len() {
            return Err(self.out_of_range(index));
        }
        self.ensure_unique(item.name(), Some(index))?;
        Ok(std::mem::replace(&mut self.items[index], item))
    }

    pub fn remove(&mut self, index: usize) -> Result<T> {
        if index >= self.items.len() {
            return Err(self.out_of_range(index));
        }
        Ok(self.items.remove(index))
    }

    pub fn remove_by_name(&mut self, name: &str) -> Option<T> {
        self.position(name).map(|index| self.items.remove(index))
    }

    /// Append every item, or none of them if any name collides.
    pub fn extend<I>(&mut self, items: I) -> Result<()>
    where
        I: IntoIterator<Item = T>,
    {
        let incoming: Vec<T> = items.into_iter().collect();
        for (offset, item) in incoming.iter().enumerate() {
            self.ensure_unique(item.name(), None)?;
            if incoming[..offset].iter().any(|other| other.name() == item.name()) {
                return Err(duplicate::<T>(item.name()));
            }
        }
        self.items.extend(incoming);
        Ok(())
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.items.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<ElementMut<'_, T>> {
        self.items.get_mut(index).map(ElementMut)
    }

    pub fn by_name(&self, name: &str) -> Option<&T> {
        self.items.iter().find(|item| item.name() == name)
    }

    pub fn by_name_mut(&mut self, name: &str) -> Option<ElementMut<'_, T>> {
        self.items
            .iter_mut()
            .find(|item| item.name() == name)
            .map(ElementMut)
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.items.iter().position(|item| item.name() == name)
    }

    pub fn contains_name(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    pub fn names(&self) -> Vec<&str> {
        self.items.iter().map(Named::name).collect()
    }

    pub fn iter(&self) -> slice::Iter<'_, T> {
        self.items.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = ElementMut<'_, T>> {
        self.items.iter_mut().map(ElementMut)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub(crate) fn slot_mut(&mut self, index: usize) -> Option<&mut T> {
        self.items.get_mut(index)
    }

    fn ensure_unique(&self, name: &str, ignore: Option<usize>) -> Result<()> {
        let clash = self
            .items
            .iter()
            .enumerate()
            .any(|(index, item)| Some(index) != ignore && item.name() == name);

        if clash {
            Err(duplicate::<T>(name))
        } else {
            Ok(())
        }
    }

    fn out_of_range(&self, index: usize) -> EngineError {
        EngineError::IndexOutOfRange {
            kind: T::KIND,
            index,
            len: self.items.len(),
        }
    }
}

fn duplicate<T: Named>(name: &str) -> EngineError {
    EngineError::DuplicateName {
        kind: T::KIND,
        name: name.to_string(),
    }
}

impl<T: Named> Default for UniqueList<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a, T> IntoIterator for &'a UniqueList<T> {
    type Item = &'a T;
    type IntoIter = slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

/// Mutable handle to one element of a [`UniqueList`].
///
/// Reads go through `Deref`. Writes are limited to operations that keep the
/// element's name, so the list stays free of duplicates; whole-element
/// writes go through [`UniqueList::replace`].
///
/// ```compile_fail
/// use taskweave::{Job, Task, TaskContext};
///
/// fn noop(_: &mut TaskContext) -> anyhow::Result<()> {
///     Ok(())
/// }
///
/// let mut job = Job::new("etl")
///     .with_tasks([Task::new("a", noop), Task::new("b", noop)])
///     .unwrap();
/// *job.task_mut("b").unwrap() = Task::new("a", noop);
/// ```
#[derive(Debug)]
pub struct ElementMut<'a, T>(&'a mut T);

impl<T> Deref for ElementMut<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &*self.0
    }
}

impl ElementMut<'_, Task> {
    pub fn set_skip(&mut self, skip: bool) {
        self.0.set_skip(skip);
    }

    pub fn run(&mut self, context: &mut TaskContext) -> Result<()> {
        self.0.run(context)
    }
}

impl ElementMut<'_, Job> {
    pub fn add_task(&mut self, task: Task) -> Result<()> {
        self.0.add_task(task)
    }

    pub fn tasks_mut(&mut self) -> &mut TaskList {
        self.0.tasks_mut()
    }

    pub fn task_mut(&mut self, name: &str) -> Option<ElementMut<'_, Task>> {
        self.0.task_mut(name)
    }

    pub fn skip_all(&mut self) {
        self.0.skip_all();
    }
}
