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

//! Generated protobuf bindings for the two wire formats this crate reads
//! and writes: aapt2's resource-table/XML schema (`aapt::pb`) and
//! bundletool's `BundleConfig` / targeting / table-of-contents schema
//! (`android::bundle`).

pub mod aapt {
    #[allow(clippy::doc_lazy_continuation)]
    #[allow(rustdoc::invalid_html_tags)]
    pub mod pb {
        include!(concat!(env!("OUT_DIR"), "/aapt.pb.rs"));
    }
}

pub mod android {
    #[allow(clippy::doc_lazy_continuation)]
    #[allow(rustdoc::invalid_html_tags)]
    pub mod bundle {
        include!(concat!(env!("OUT_DIR"), "/android.bundle.rs"));
    }
}
