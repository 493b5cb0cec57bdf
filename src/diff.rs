// Copyright 2025 RustFS Team
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Ordinal-aware diffing of a live resource set against a desired one.

use crate::utils::meta::{ORDINAL_ANNOTATION, ordinal_annotation};
use kube::ResourceExt;
use std::collections::HashMap;

/// Changes required to converge current resources to desired resources.
///
/// Every list is sorted by ordinal ascending, so `name-2` always precedes
/// `name-11`.
#[derive(Debug, Clone)]
pub struct Diff<T> {
    /// Desired resources with no live counterpart.
    pub creates: Vec<T>,
    /// Desired resources whose live counterpart differs.
    pub updates: Vec<T>,
    /// Live resources with no desired counterpart.
    pub deletes: Vec<T>,
}

impl<T> Diff<T> {
    pub fn is_empty(&self) -> bool {
        self.creates.is_empty() && self.updates.is_empty() && self.deletes.is_empty()
    }

    /// True while the set still has members to add or remove.
    pub fn is_scaling(&self) -> bool {
        !self.creates.is_empty() || !self.deletes.is_empty()
    }
}

fn parse_ordinal<T: ResourceExt>(obj: &T) -> i64 {
    let raw = ordinal_annotation(obj).unwrap_or_default();
    match raw.parse::<i64>() {
        Ok(ordinal) => ordinal,
        Err(e) => panic!(
            "resource {} has invalid {} annotation {:?}: {}",
            obj.name_any(),
            ORDINAL_ANNOTATION,
            raw,
            e
        ),
    }
}

/// Maps name to (ordinal, position) and panics on a duplicate name.
fn index<T: ResourceExt>(objs: &[T], side: &str) -> HashMap<String, i64> {
    let mut index = HashMap::with_capacity(objs.len());
    for obj in objs {
        let name = obj.name_any();
        let ordinal = parse_ordinal(obj);
        if index.insert(name.clone(), ordinal).is_some() {
            panic!("duplicate name {name:?} in {side} resources");
        }
    }
    index
}

/// Computes creates, updates and deletes between `current` and `desired`.
///
/// `equal(current, desired)` decides whether a resource present on both sides
/// needs an update. Panics if either side contains a duplicate name or a
/// resource without a parsable ordinal annotation.
pub fn diff<T, F>(current: Vec<T>, desired: Vec<T>, equal: F) -> Diff<T>
where
    T: ResourceExt,
    F: Fn(&T, &T) -> bool,
{
    let current_index = index(&current, "current");
    let desired_index = index(&desired, "desired");

    let mut live: HashMap<String, T> = HashMap::with_capacity(current.len());
    let mut deletes = Vec::new();
    for obj in current {
        let name = obj.name_any();
        if desired_index.contains_key(&name) {
            live.insert(name, obj);
        } else {
            deletes.push((current_index[&name], obj));
        }
    }

    let mut creates = Vec::new();
    let mut updates = Vec::new();
    for obj in desired {
        let name = obj.name_any();
        let ordinal = desired_index[&name];
        match live.get(&name) {
            None => creates.push((ordinal, obj)),
            Some(existing) if !equal(existing, &obj) => updates.push((ordinal, obj)),
            Some(_) => {}
        }
    }

    Diff {
        creates: sorted(creates),
        updates: sorted(updates),
        deletes: sorted(deletes),
    }
}

fn sorted<T>(mut items: Vec<(i64, T)>) -> Vec<T> {
    items.sort_by_key(|(ordinal, _)| *ordinal);
    items.into_iter().map(|(_, obj)| obj).collect()
}
