// Copyright 2024 Google LLC
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

//! Content-addressed temporary zip storage for file payloads (spec
//! §4.B). Entries are staged through an [EntryPackBuilder], deduped by
//! source location, then closed into an immutable [EntryPack].

mod builder;
mod pack;

pub use builder::{EntryHandle, EntryPackBuilder};
pub use pack::{EntryPack, PackStrategy, SelectedEntry, SelectedSource};
