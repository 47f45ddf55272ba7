//! Export a [`Dataset`] into the scan container layout.
//!
//! ```text
//! /FileVersion
//! /<index>/Header/<Key>
//! /<index>/Header/OriginalFile
//! /<index>/Header/Phases/<id>/{Phase,MaterialName,...,HKLFamilies/<n>}
//! /<index>/Data/<column>
//! ```

use std::collections::BTreeMap;

use super::layout;
use super::memory::{MemContainer, Node};
use super::Scalar;
use crate::ang::grammar::write_header;
use crate::types::dataset::{Dataset, HeaderValue, NumericArray};
use crate::types::phase::Phase;

fn header_node(value: &HeaderValue) -> Node {
    match value {
        HeaderValue::Int(v) => Node::Scalar(Scalar::Int(*v)),
        HeaderValue::Float(v) => Node::Scalar(Scalar::Float(*v)),
        HeaderValue::Text(s) => Node::Scalar(Scalar::Str(s.clone())),
        HeaderValue::Floats(v) => Node::Array(NumericArray::Float(v.clone())),
    }
}

fn phase_node(phase: &Phase) -> Node {
    let str_node = |s: &str| Node::Scalar(Scalar::Str(s.to_string()));

    let families: BTreeMap<String, Node> = phase
        .families
        .iter()
        .enumerate()
        .map(|(i, f)| (i.to_string(), Node::Record(f.encode().to_vec())))
        .collect();

    let mut children = BTreeMap::new();
    children.insert(
        layout::PHASE.to_string(),
        Node::Scalar(Scalar::Int(phase.id as i64)),
    );
    children.insert(layout::MATERIAL_NAME.to_string(), str_node(&phase.material_name));
    children.insert(layout::FORMULA.to_string(), str_node(&phase.formula));
    children.insert(layout::INFO.to_string(), str_node(&phase.info));
    children.insert(
        layout::SYMMETRY.to_string(),
        Node::Scalar(Scalar::Int(phase.symmetry.code() as i64)),
    );
    children.insert(
        layout::LATTICE_CONSTANTS.to_string(),
        Node::Array(NumericArray::Float(
            phase.lattice_constants.to_array().to_vec(),
        )),
    );
    children.insert(
        layout::NUMBER_HKL_FAMILIES.to_string(),
        Node::Scalar(Scalar::Int(phase.number_families() as i64)),
    );
    children.insert(
        layout::CATEGORIES.to_string(),
        Node::Array(NumericArray::Int(phase.categories.clone())),
    );
    children.insert(layout::HKL_FAMILIES.to_string(), Node::Group(families));
    Node::Group(children)
}

/// Build the `/<index>` group for a dataset.
///
/// `original_text` is stored as `Header/OriginalFile`; when absent, the
/// header is rendered back to `.ang` text.
pub fn dataset_to_node(dataset: &Dataset, original_text: Option<&str>) -> Node {
    let mut header: BTreeMap<String, Node> = dataset
        .header
        .iter()
        .map(|(key, value)| (key.clone(), header_node(value)))
        .collect();

    let original = original_text
        .map(str::to_string)
        .unwrap_or_else(|| write_header(&dataset.header, dataset.phases.phases()));
    header.insert(
        layout::ORIGINAL_FILE.to_string(),
        Node::Scalar(Scalar::Str(original)),
    );

    let phases: BTreeMap<String, Node> = dataset
        .phases
        .iter()
        .map(|p| (p.id.to_string(), phase_node(p)))
        .collect();
    header.insert(layout::PHASES.to_string(), Node::Group(phases));

    let data: BTreeMap<String, Node> = dataset
        .data
        .iter()
        .map(|(name, col)| (name.clone(), Node::Array(col.clone())))
        .collect();

    let mut group = BTreeMap::new();
    group.insert(layout::HEADER.to_string(), Node::Group(header));
    group.insert(layout::DATA.to_string(), Node::Group(data));
    Node::Group(group)
}

/// Wrap a dataset as a single-entry container under `/<index>`, stamped with
/// the current layout version.
pub fn dataset_to_container(index: &str, dataset: &Dataset) -> MemContainer {
    let mut root = BTreeMap::new();
    root.insert(
        layout::FILE_VERSION.to_string(),
        Node::Scalar(Scalar::Int(layout::MAX_FILE_VERSION)),
    );
    root.insert(
        index.to_string(),
        dataset_to_node(dataset, dataset.original_header.as_deref()),
    );
    MemContainer::new(Node::Group(root))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::phase::{HklFamily, PhaseRegistry};

    fn dataset() -> Dataset {
        let mut phase = Phase::new(3);
        phase.material_name = "Iron".into();
        phase.families = vec![HklFamily {
            h: 1,
            k: 1,
            l: 0,
            s1: 1,
            diffraction_intensity: 9.5,
            s2: 1,
        }];

        let mut ds = Dataset {
            phases: PhaseRegistry::try_from(vec![phase]).unwrap(),
            ..Dataset::default()
        };
        ds.header.insert("XSTEP", HeaderValue::Float(0.5));
        ds.header
            .insert("SampleTransformationAxis", HeaderValue::Floats(vec![0.0, 1.0, 0.0]));
        ds.data
            .insert("PhaseData".into(), NumericArray::Int(vec![3, 3]));
        ds.point_count = 2;
        ds
    }

    #[test]
    fn test_layout_paths() {
        let c = dataset_to_container("7", &dataset());
        let root = c.root();

        assert_eq!(
            root.get_path("/FileVersion"),
            Some(&Node::Scalar(Scalar::Int(layout::MAX_FILE_VERSION)))
        );
        assert_eq!(
            root.get_path("/7/Header/XSTEP"),
            Some(&Node::Scalar(Scalar::Float(0.5)))
        );
        assert!(matches!(
            root.get_path("/7/Header/SampleTransformationAxis"),
            Some(Node::Array(NumericArray::Float(_)))
        ));
        assert_eq!(
            root.get_path("/7/Header/Phases/3/NumberHKLFamilies"),
            Some(&Node::Scalar(Scalar::Int(1)))
        );
        assert!(matches!(
            root.get_path("/7/Data/PhaseData"),
            Some(Node::Array(NumericArray::Int(_)))
        ));
    }

    #[test]
    fn test_family_records_are_encoded() {
        let ds = dataset();
        let node = dataset_to_node(&ds, None);
        match node.get_path("Header/Phases/3/HKLFamilies/0") {
            Some(Node::Record(bytes)) => {
                assert_eq!(HklFamily::decode(bytes).unwrap(), ds.phases.phases()[0].families[0]);
            }
            other => panic!("expected record, got {:?}", other),
        }
    }

    #[test]
    fn test_original_file_falls_back_to_rendered_header() {
        let node = dataset_to_node(&dataset(), None);
        match node.get_path("Header/OriginalFile") {
            Some(Node::Scalar(Scalar::Str(text))) => {
                assert!(text.contains("# XSTEP: 0.5"));
                assert!(text.contains("# Phase 3"));
            }
            other => panic!("expected text, got {:?}", other),
        }

        let node = dataset_to_node(&dataset(), Some("# verbatim\n"));
        assert_eq!(
            node.get_path("Header/OriginalFile"),
            Some(&Node::Scalar(Scalar::Str("# verbatim\n".into())))
        );
    }
}
