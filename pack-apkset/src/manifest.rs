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

//! Reads the handful of `AndroidManifest.xml` attributes the assembler
//! needs from a split's already-parsed `XmlNode` tree: `uses-sdk`'s
//! `minSdkVersion` (spec §4.F's `manifestMinSdk`) and `application`'s
//! `extractNativeLibs` (spec §4.D's native-library compression rule).

use pack_proto::aapt::pb::{xml_node::Node, XmlElement, XmlNode};

fn root_element(manifest: &XmlNode) -> Option<&XmlElement> {
    match &manifest.node {
        Some(Node::Element(element)) => Some(element),
        _ => None
    }
}

fn find_child<'a>(element: &'a XmlElement, name: &str) -> Option<&'a XmlElement> {
    element.child.iter().find_map(|child| match &child.node {
        Some(Node::Element(e)) if e.name == name => Some(e),
        _ => None
    })
}

fn attribute_value<'a>(element: &'a XmlElement, name: &str) -> Option<&'a str> {
    element.attribute.iter().find(|attr| attr.name == name).map(|attr| attr.value.as_str())
}

/// The manifest's `<uses-sdk android:minSdkVersion="...">`. Defaults to
/// 1 (no restriction) when the manifest has no `uses-sdk` element or
/// the attribute doesn't parse, matching Android's own default.
pub fn manifest_min_sdk(manifest: &XmlNode) -> i32 {
    root_element(manifest)
        .and_then(|root| find_child(root, "uses-sdk"))
        .and_then(|uses_sdk| attribute_value(uses_sdk, "minSdkVersion"))
        .and_then(|value| value.parse().ok())
        .unwrap_or(1)
}

/// The manifest's `<application android:extractNativeLibs="...">`.
/// Defaults to `true` (Android's legacy default) when absent.
pub fn manifest_extract_native_libs(manifest: &XmlNode) -> bool {
    root_element(manifest)
        .and_then(|root| find_child(root, "application"))
        .and_then(|application| attribute_value(application, "extractNativeLibs"))
        .map(|value| value != "false" && value != "0")
        .unwrap_or(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pack_proto::aapt::pb::{xml_node, XmlAttribute};

    fn element(name: &str, attributes: Vec<(&str, &str)>, children: Vec<XmlNode>) -> XmlNode {
        XmlNode {
            node: Some(xml_node::Node::Element(XmlElement {
                namespace_declaration: vec![],
                namespace_uri: String::new(),
                name: name.to_string(),
                attribute: attributes
                    .into_iter()
                    .map(|(name, value)| XmlAttribute {
                        namespace_uri: String::new(),
                        name: name.to_string(),
                        value: value.to_string(),
                        source: None,
                        resource_id: 0,
                        compiled_item: None
                    })
                    .collect(),
                child: children
            })),
            source: None
        }
    }

    #[test]
    fn reads_min_sdk_from_uses_sdk_element() {
        let manifest = element("manifest", vec![], vec![element("uses-sdk", vec![("minSdkVersion", "24")], vec![])]);
        assert_eq!(manifest_min_sdk(&manifest), 24);
    }

    #[test]
    fn defaults_min_sdk_to_one_without_uses_sdk() {
        let manifest = element("manifest", vec![], vec![]);
        assert_eq!(manifest_min_sdk(&manifest), 1);
    }

    #[test]
    fn reads_extract_native_libs_false() {
        let manifest = element(
            "manifest",
            vec![],
            vec![element("application", vec![("extractNativeLibs", "false")], vec![])]
        );
        assert!(!manifest_extract_native_libs(&manifest));
    }

    #[test]
    fn defaults_extract_native_libs_to_true() {
        let manifest = element("manifest", vec![], vec![element("application", vec![], vec![])]);
        assert!(manifest_extract_native_libs(&manifest));
    }
}
