//! Product manifest parsing into a generic tag tree, plus file path extraction.

use crate::error::{FetchError, Result};
use roxmltree::Node;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// A parsed markup element. Children sharing a tag collapse into a `List`,
/// otherwise an element is a `Map` of child tag to value, with the element's
/// attributes merged in under their attribute names. Leaves are their trimmed
/// text content.
#[derive(Debug, Clone, PartialEq)]
pub enum XmlValue {
    Scalar(String),
    List(Vec<XmlValue>),
    Map(BTreeMap<String, XmlValue>),
}

impl XmlValue {
    pub fn get(&self, key: &str) -> Option<&XmlValue> {
        match self {
            XmlValue::Map(map) => map.get(key),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            XmlValue::Scalar(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[XmlValue]> {
        match self {
            XmlValue::List(items) => Some(items),
            _ => None,
        }
    }
}

pub fn parse_manifest(path: &Path) -> Result<XmlValue> {
    let content = fs::read_to_string(path)?;
    parse_manifest_str(&content)
}

pub fn parse_manifest_str(content: &str) -> Result<XmlValue> {
    let doc = roxmltree::Document::parse(content)?;
    Ok(XmlValue::Map(element_to_map(doc.root_element())))
}

/// Walks dataObjectSection -> dataObject -> byteStream -> fileLocation and
/// collects every href in document order, stripping a leading "./".
pub fn extract_file_paths(tree: &XmlValue) -> Result<Vec<String>> {
    let section = tree
        .get("dataObjectSection")
        .ok_or_else(|| shape_error("manifest has no dataObjectSection"))?;
    let objects = section
        .get("dataObject")
        .ok_or_else(|| shape_error("dataObjectSection has no dataObject entries"))?;

    // A section with a single data object parses as a map rather than a list.
    let entries: Vec<&XmlValue> = match objects {
        XmlValue::List(items) => items.iter().collect(),
        XmlValue::Map(_) => vec![objects],
        XmlValue::Scalar(_) => {
            return Err(shape_error("dataObject entries are not structured"))
        }
    };

    entries.into_iter().map(extract_relative_href).collect()
}

fn extract_relative_href(entry: &XmlValue) -> Result<String> {
    let href = entry
        .get("byteStream")
        .and_then(|stream| stream.get("fileLocation"))
        .and_then(|location| location.get("href"))
        .and_then(|href| href.as_str())
        .ok_or_else(|| shape_error("dataObject is missing byteStream/fileLocation/href"))?;
    Ok(href.strip_prefix("./").unwrap_or(href).to_string())
}

fn shape_error(message: &str) -> FetchError {
    FetchError::ManifestShape(message.to_string())
}

fn element_children<'a, 'input>(node: Node<'a, 'input>) -> Vec<Node<'a, 'input>> {
    node.children().filter(|n| n.is_element()).collect()
}

fn children_share_tag(children: &[Node]) -> bool {
    children.len() >= 2 && children[0].tag_name().name() == children[1].tag_name().name()
}

fn attribute_map(node: Node) -> BTreeMap<String, XmlValue> {
    node.attributes()
        .map(|a| (a.name().to_string(), XmlValue::Scalar(a.value().to_string())))
        .collect()
}

fn element_to_map(node: Node) -> BTreeMap<String, XmlValue> {
    let mut map = attribute_map(node);
    for child in element_children(node) {
        map.insert(child.tag_name().name().to_string(), convert_in_map(child));
    }
    map
}

fn convert_in_map(node: Node) -> XmlValue {
    let children = element_children(node);
    if children.is_empty() {
        let attributes = attribute_map(node);
        if attributes.is_empty() {
            XmlValue::Scalar(node.text().unwrap_or("").trim().to_string())
        } else {
            XmlValue::Map(attributes)
        }
    } else if children_share_tag(&children) {
        // The repeated tag stays visible as the single key over the list.
        let mut map = attribute_map(node);
        map.insert(
            children[0].tag_name().name().to_string(),
            XmlValue::List(element_to_list(node)),
        );
        XmlValue::Map(map)
    } else {
        XmlValue::Map(element_to_map(node))
    }
}

fn element_to_list(node: Node) -> Vec<XmlValue> {
    let mut items = Vec::new();
    for child in element_children(node) {
        let grandchildren = element_children(child);
        if !grandchildren.is_empty() {
            if children_share_tag(&grandchildren) {
                items.push(XmlValue::List(element_to_list(child)));
            } else {
                items.push(XmlValue::Map(element_to_map(child)));
            }
        } else if let Some(text) = child.text() {
            let text = text.trim();
            if !text.is_empty() {
                items.push(XmlValue::Scalar(text.to_string()));
            }
        }
    }
    items
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANIFEST_CONTENT: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<xfdu:XFDU xmlns:xfdu="urn:ccsds:schema:xfdu:1" version="esa/safe/sentinel/1.1">
    <informationPackageMap>
        <xfdu:contentUnit unitType="Product_Level-2A" textInfo="SENTINEL-2 MSI Level-2A"/>
    </informationPackageMap>
    <dataObjectSection>
        <dataObject ID="IMG_DATA_Band_B02_10m_Tile1_Data">
            <byteStream mimeType="application/octet-stream" size="135297067">
                <fileLocation locatorType="URL" href="./GRANULE/L2A_T19HCC_A046314_20240504T195929/IMG_DATA/R10m/T19HCC_20240504T195901_B02_10m.jp2"/>
                <checksum checksumName="SHA3-256">D54088291C554975B475E31D078EEEEB</checksum>
            </byteStream>
        </dataObject>
        <dataObject ID="IMG_DATA_Band_TCI_10m_Tile1_Data">
            <byteStream mimeType="application/octet-stream" size="9561">
                <fileLocation locatorType="URL" href="./GRANULE/L2A_T19HCC_A046314_20240504T195929/IMG_DATA/R10m/T19HCC_20240504T195901_TCI_10m.jp2"/>
                <checksum checksumName="SHA3-256">AB12</checksum>
            </byteStream>
        </dataObject>
        <dataObject ID="S2_Level-2A_Product_Metadata">
            <byteStream mimeType="text/xml" size="54321">
                <fileLocation locatorType="URL" href="MTD_MSIL2A.xml"/>
                <checksum checksumName="SHA3-256">CD34</checksum>
            </byteStream>
        </dataObject>
    </dataObjectSection>
</xfdu:XFDU>"#;

    #[test]
    fn test_extract_paths_in_document_order() {
        let tree = parse_manifest_str(MANIFEST_CONTENT).unwrap();
        let paths = extract_file_paths(&tree).unwrap();
        assert_eq!(
            paths,
            vec![
                "GRANULE/L2A_T19HCC_A046314_20240504T195929/IMG_DATA/R10m/T19HCC_20240504T195901_B02_10m.jp2",
                "GRANULE/L2A_T19HCC_A046314_20240504T195929/IMG_DATA/R10m/T19HCC_20240504T195901_TCI_10m.jp2",
                "MTD_MSIL2A.xml",
            ]
        );
    }

    #[test]
    fn test_single_data_object_still_extracts() {
        let content = r#"
<manifest>
    <dataObjectSection>
        <dataObject ID="only">
            <byteStream size="10">
                <fileLocation href="./measurement/image.tiff"/>
            </byteStream>
        </dataObject>
    </dataObjectSection>
</manifest>"#;
        let tree = parse_manifest_str(content).unwrap();
        let paths = extract_file_paths(&tree).unwrap();
        assert_eq!(paths, vec!["measurement/image.tiff"]);
    }

    #[test]
    fn test_missing_section_is_a_shape_error() {
        let tree = parse_manifest_str("<manifest><other>x</other></manifest>").unwrap();
        let result = extract_file_paths(&tree);
        assert!(matches!(result, Err(FetchError::ManifestShape(_))));
    }

    #[test]
    fn test_data_object_without_file_location_is_a_shape_error() {
        let content = r#"
<manifest>
    <dataObjectSection>
        <dataObject ID="a">
            <byteStream size="10">
                <fileLocation href="./good/file.jp2"/>
            </byteStream>
        </dataObject>
        <dataObject ID="b">
            <byteStream size="10"/>
        </dataObject>
    </dataObjectSection>
</manifest>"#;
        let tree = parse_manifest_str(content).unwrap();
        let result = extract_file_paths(&tree);
        assert!(matches!(result, Err(FetchError::ManifestShape(_))));
    }

    #[test]
    fn test_malformed_markup_is_a_parse_error() {
        let result = parse_manifest_str("<manifest><dataObjectSection></manifest>");
        assert!(matches!(result, Err(FetchError::ManifestParse(_))));
    }

    #[test]
    fn test_tree_shapes() {
        let content = r#"
<root version="1">
    <single>
        <value>  padded  </value>
    </single>
    <items kind="list">
        <item>one</item>
        <item>two</item>
    </items>
    <leaf att="x"/>
</root>"#;
        let tree = parse_manifest_str(content).unwrap();

        assert_eq!(tree.get("version").and_then(XmlValue::as_str), Some("1"));
        assert_eq!(
            tree.get("single")
                .and_then(|s| s.get("value"))
                .and_then(XmlValue::as_str),
            Some("padded")
        );

        let items = tree
            .get("items")
            .and_then(|i| i.get("item"))
            .and_then(XmlValue::as_list)
            .unwrap();
        assert_eq!(
            items,
            &[
                XmlValue::Scalar("one".to_string()),
                XmlValue::Scalar("two".to_string())
            ]
        );
        assert_eq!(
            tree.get("items").and_then(|i| i.get("kind")).and_then(XmlValue::as_str),
            Some("list")
        );

        assert_eq!(
            tree.get("leaf").and_then(|l| l.get("att")).and_then(XmlValue::as_str),
            Some("x")
        );
    }

    #[test]
    fn test_parse_manifest_reads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("manifest.safe");
        fs::write(&path, MANIFEST_CONTENT).unwrap();

        let tree = parse_manifest(&path).unwrap();
        assert_eq!(extract_file_paths(&tree).unwrap().len(), 3);
    }
}
