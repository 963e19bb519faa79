// lock resources shared between lets and pipes.
//
// every let and every pipe owns one SharedResource. resources are linked to each other: a pipe's
// resource is linked to the resources of each of its lets, and connecting an outlet to an inlet
// links their two resources. a resource group is a connected component of that link relation,
// and the whole group shares a single lock. so locking any let locks the entire topology it is
// currently wired into, which is what lets a probe walk across pipes and invoke the resulting
// callback without taking any further locks.
//
// groups are merged when a link joins two components and split when an unlink separates one.
// merging and splitting repoint each member's `group` field while the affected groups are held,
// so a thread that read a stale group and then acquired it will notice, release it, and retry.
//
// deadlock freedom: a thread holds at most the groups it acquired in one call to `lock` or
// `lock_with`, and `lock_with` acquires them in ascending group id order. ids are unique and
// totally ordered, so no two threads can each hold a group the other is waiting for.

use smallvec::{smallvec, SmallVec};
use std::{
    collections::HashSet,
    sync::{
        atomic::{AtomicU64, Ordering::Relaxed},
        Arc, Condvar, Mutex, Weak,
    },
};


// source of both resource ids and group ids.
static NEXT_ID: AtomicU64 = AtomicU64::new(1);

fn next_id() -> u64 {
    NEXT_ID.fetch_add(1, Relaxed)
}


/// What a resource is attached to, for diagnostics.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub(crate) enum ResourceKind {
    Inlet,
    Outlet,
    Pipe,
}

/// A lockable unit owned by one let or pipe
pub(crate) struct SharedResource {
    id: u64,
    kind: ResourceKind,
    // only repointed while both the old and new group are held by the repointing thread.
    group: Mutex<Arc<Group>>,
    // only mutated while this resource's group is held.
    links: Mutex<SmallVec<[Weak<SharedResource>; 3]>>,
}

// lock shared by all resources in a group.
//
// this is a hand-rolled lock rather than a Mutex<()> so that a guard can own an Arc<Group>
// without borrowing from it.
struct Group {
    id: u64,
    locked: Mutex<bool>,
    cond: Condvar,
}

impl Group {
    fn new(locked: bool) -> Arc<Self> {
        Arc::new(Group {
            id: next_id(),
            locked: Mutex::new(locked),
            cond: Condvar::new(),
        })
    }

    fn acquire(&self) {
        let mut locked = self.locked.lock().unwrap();
        while *locked {
            locked = self.cond.wait(locked).unwrap();
        }
        *locked = true;
    }

    fn release(&self) {
        let mut locked = self.locked.lock().unwrap();
        debug_assert!(*locked, "released group that was not held (internal bug)");
        *locked = false;
        self.cond.notify_one();
    }
}

/// Proof of holding the groups of one or more resources. Releases them when dropped.
pub(crate) struct ResourceGuard {
    groups: SmallVec<[Arc<Group>; 3]>,
}

impl ResourceGuard {
    // whether this guard holds the group the resource currently belongs to.
    pub(crate) fn covers(&self, resource: &SharedResource) -> bool {
        let group = resource.current_group();
        self.groups.iter().any(|held| Arc::ptr_eq(held, &group))
    }
}

impl Drop for ResourceGuard {
    fn drop(&mut self) {
        for group in self.groups.iter().rev() {
            group.release();
        }
    }
}

impl SharedResource {
    /// Construct an unlinked resource in a group of its own.
    pub(crate) fn new(kind: ResourceKind) -> Arc<Self> {
        Arc::new(SharedResource {
            id: next_id(),
            kind,
            group: Mutex::new(Group::new(false)),
            links: Mutex::new(SmallVec::new()),
        })
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    fn current_group(&self) -> Arc<Group> {
        Arc::clone(&self.group.lock().unwrap())
    }

    fn set_group(&self, group: &Arc<Group>) {
        *self.group.lock().unwrap() = Arc::clone(group);
    }

    fn linked(&self) -> SmallVec<[Arc<SharedResource>; 3]> {
        self.links.lock().unwrap().iter().filter_map(Weak::upgrade).collect()
    }

    /// Lock this resource's group.
    pub(crate) fn lock(&self) -> ResourceGuard {
        loop {
            let group = self.current_group();
            group.acquire();
            if Arc::ptr_eq(&group, &self.current_group()) {
                return ResourceGuard { groups: smallvec![group] };
            }
            // merged or split away while we were waiting
            group.release();
        }
    }

    /// Lock the groups of both resources together, in global group order.
    pub(crate) fn lock_with(a: &SharedResource, b: &SharedResource) -> ResourceGuard {
        loop {
            let group_a = a.current_group();
            let group_b = b.current_group();
            let groups: SmallVec<[Arc<Group>; 3]> = if Arc::ptr_eq(&group_a, &group_b) {
                smallvec![group_a.clone()]
            } else if group_a.id < group_b.id {
                smallvec![group_a.clone(), group_b.clone()]
            } else {
                smallvec![group_b.clone(), group_a.clone()]
            };
            for group in &groups {
                group.acquire();
            }
            if Arc::ptr_eq(&group_a, &a.current_group())
                && Arc::ptr_eq(&group_b, &b.current_group())
            {
                return ResourceGuard { groups };
            }
            for group in groups.iter().rev() {
                group.release();
            }
        }
    }

    /// Link two resources, merging `b`'s group into `a`'s.
    pub(crate) fn link(a: &Arc<SharedResource>, b: &Arc<SharedResource>, guard: &ResourceGuard) {
        debug_assert!(guard.covers(a) && guard.covers(b), "linking without lock (internal bug)");
        let group_a = a.current_group();
        let group_b = b.current_group();
        if !Arc::ptr_eq(&group_a, &group_b) {
            trace!(from = group_b.id, into = group_a.id, "merging resource groups");
            // repoint every member of b's group. the group check doubles as the visited set.
            let mut stack: Vec<Arc<SharedResource>> = vec![Arc::clone(b)];
            while let Some(resource) = stack.pop() {
                if !Arc::ptr_eq(&resource.current_group(), &group_b) {
                    continue;
                }
                resource.set_group(&group_a);
                stack.extend(resource.linked());
            }
        }
        a.links.lock().unwrap().push(Arc::downgrade(b));
        b.links.lock().unwrap().push(Arc::downgrade(a));
    }

    /// Remove the link between two resources, splitting their group if that separates them.
    ///
    /// If a split happens, `b`'s side moves to a new group which is created already held by
    /// `guard`.
    pub(crate) fn unlink(
        a: &Arc<SharedResource>,
        b: &Arc<SharedResource>,
        guard: &mut ResourceGuard,
    ) {
        debug_assert!(guard.covers(a) && guard.covers(b), "unlinking without lock (internal bug)");
        remove_link(a, b);
        remove_link(b, a);

        // is b still reachable from a?
        let mut seen = HashSet::new();
        let mut stack: Vec<Arc<SharedResource>> = vec![Arc::clone(a)];
        while let Some(resource) = stack.pop() {
            if !seen.insert(resource.id) {
                continue;
            }
            if resource.id == b.id {
                return;
            }
            stack.extend(resource.linked());
        }

        let old = b.current_group();
        let split = Group::new(true);
        trace!(from = old.id, into = split.id, kind = ?b.kind, "splitting resource group");
        let mut stack: Vec<Arc<SharedResource>> = vec![Arc::clone(b)];
        while let Some(resource) = stack.pop() {
            if !Arc::ptr_eq(&resource.current_group(), &old) {
                continue;
            }
            resource.set_group(&split);
            stack.extend(resource.linked());
        }
        guard.groups.push(split);
    }

    // whether the two resources currently share a group.
    #[cfg(test)]
    fn same_group(a: &SharedResource, b: &SharedResource) -> bool {
        Arc::ptr_eq(&a.current_group(), &b.current_group())
    }
}

fn remove_link(from: &SharedResource, to: &SharedResource) {
    let mut links = from.links.lock().unwrap();
    if let Some(i) = links.iter().position(|weak| weak.as_ptr() == to as *const SharedResource) {
        links.swap_remove(i);
    }
}
