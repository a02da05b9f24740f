// This file is part of kestrel-ledger.
// Copyright (C) 2025 Midnight Foundation
// SPDX-License-Identifier: Apache-2.0
// Licensed under the Apache License, Version 2.0 (the "License");
// You may not use this file except in compliance with the License.
// You may obtain a copy of the License at
// http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::borrow::Cow;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// A type that can be described by a fixed type string.
///
/// The tag uniquely identifies the type and must never change meaning once
/// values carrying it have been persisted or sent over the wire. A new layout
/// gets a new version suffix instead, e.g. `wire-transaction[v2]`.
///
/// ## Conventions
///
/// Tags use kebab case, alphanumerics, dashes, square brackets for versions and
/// (for generic arguments only) parentheses and commas:
///
/// - `u32` <-> `"u32"`
/// - `Option<StateRef>` <-> `"option(state-ref[v1])"`
/// - `(A, B)` <-> `"(a,b)"`
pub trait Tagged {
    fn tag() -> Cow<'static, str>;

    /// A decomposition of the tag into primitive types, tuples `(a,b)` and sum
    /// types `[a,b]`. A layout change must also change this factor.
    fn tag_unique_factor() -> String;
}

impl<T: Tagged + ?Sized> Tagged for &T {
    fn tag() -> Cow<'static, str> {
        T::tag()
    }
    fn tag_unique_factor() -> String {
        T::tag_unique_factor()
    }
}

impl<T: Tagged> Tagged for Arc<T> {
    fn tag() -> Cow<'static, str> {
        T::tag()
    }
    fn tag_unique_factor() -> String {
        T::tag_unique_factor()
    }
}

impl<T: Tagged> Tagged for Box<T> {
    fn tag() -> Cow<'static, str> {
        T::tag()
    }
    fn tag_unique_factor() -> String {
        T::tag_unique_factor()
    }
}

impl<T: Tagged> Tagged for Option<T> {
    fn tag() -> Cow<'static, str> {
        Cow::Owned(format!("option({})", T::tag()))
    }
    fn tag_unique_factor() -> String {
        format!("[(),{}]", T::tag())
    }
}

impl<T: Tagged> Tagged for Vec<T> {
    fn tag() -> Cow<'static, str> {
        Cow::Owned(format!("vec({})", T::tag()))
    }
    fn tag_unique_factor() -> String {
        format!("vec({})", T::tag())
    }
}

impl<T: Tagged> Tagged for BTreeSet<T> {
    fn tag() -> Cow<'static, str> {
        Cow::Owned(format!("set({})", T::tag()))
    }
    fn tag_unique_factor() -> String {
        format!("set({})", T::tag())
    }
}

impl<K: Tagged, V: Tagged> Tagged for BTreeMap<K, V> {
    fn tag() -> Cow<'static, str> {
        Cow::Owned(format!("map({},{})", K::tag(), V::tag()))
    }
    fn tag_unique_factor() -> String {
        format!("map({},{})", K::tag(), V::tag())
    }
}

impl<const N: usize> Tagged for [u8; N] {
    fn tag() -> Cow<'static, str> {
        Cow::Owned(format!("array(u8,{N})"))
    }
    fn tag_unique_factor() -> String {
        format!("array(u8,{N})")
    }
}

impl Tagged for String {
    fn tag() -> Cow<'static, str> {
        Cow::Borrowed("string")
    }
    fn tag_unique_factor() -> String {
        "string".into()
    }
}

impl Tagged for str {
    fn tag() -> Cow<'static, str> {
        Cow::Borrowed("string")
    }
    fn tag_unique_factor() -> String {
        "string".into()
    }
}
