//! # Validation Tier Tests (T0-T5)
//!
//! If ANY tier fails, the index is INVALID.
//!
//! ## Tiers
//! - T0: Bit Codec
//! - T1: Graph Input
//! - T2: Canonical Forms
//! - T3: Bisimulation Layers
//! - T4: Blocks
//! - T5: Cores

use cpqindex_core::{
    BitReader, BitWriter, CanonEngine, CanonicalLabeler, Cpq, Index, IndexError, IndexOptions,
    Ingestor, LabeledGraph, LabelingPool, LabelingPoolConfig, NoProgress, Pair,
    RefinementLabeler,
};

// =============================================================================
// FIXTURES
// =============================================================================

/// Two diamonds sharing vertex 3, one label per diamond side.
const DIAMONDS: &str = "7 8 4
0 1 0
0 2 1
1 3 0
2 3 1
3 4 2
3 5 3
4 6 2
5 6 3
";

fn diamonds() -> LabeledGraph {
    Ingestor::read_graph_str(DIAMONDS).expect("graph")
}

fn sorted_index(options: &IndexOptions) -> Index {
    let mut index = Index::build(&diamonds(), options, &NoProgress).expect("index");
    index.sort();
    index
}

fn listing(index: &Index) -> Vec<(Vec<(u32, u32)>, Vec<String>)> {
    index
        .blocks()
        .iter()
        .map(|block| {
            let pairs = block.pairs().iter().map(|p| (p.src, p.trg)).collect();
            let labels = block.labels().iter().map(|s| s.to_string()).collect();
            (pairs, labels)
        })
        .collect()
}

fn expected(fixture: &[(&[(u32, u32)], &[&str])]) -> Vec<(Vec<(u32, u32)>, Vec<String>)> {
    fixture
        .iter()
        .map(|(pairs, labels)| {
            (
                pairs.to_vec(),
                labels.iter().map(|l| l.to_string()).collect(),
            )
        })
        .collect()
}

/// Sorted depth-two blocks of the diamonds: pairs, then label sequences.
const DIAMONDS_K2: &[(&[(u32, u32)], &[&str])] = &[
    (&[(0, 0)], &["00⁻", "11⁻"]),
    (&[(0, 1), (1, 3)], &["0"]),
    (&[(0, 2), (2, 3)], &["1"]),
    (&[(0, 3)], &["00", "11"]),
    (&[(1, 0), (3, 1)], &["0⁻"]),
    (&[(1, 1)], &["00⁻", "0⁻0"]),
    (&[(1, 2)], &["01⁻", "0⁻1"]),
    (&[(1, 4)], &["02"]),
    (&[(1, 5)], &["03"]),
    (&[(2, 0), (3, 2)], &["1⁻"]),
    (&[(2, 1)], &["10⁻", "1⁻0"]),
    (&[(2, 2)], &["11⁻", "1⁻1"]),
    (&[(2, 4)], &["12"]),
    (&[(2, 5)], &["13"]),
    (&[(3, 0)], &["0⁻0⁻", "1⁻1⁻"]),
    (&[(3, 3)], &["0⁻0", "1⁻1", "22⁻", "33⁻"]),
    (&[(3, 4), (4, 6)], &["2"]),
    (&[(3, 5), (5, 6)], &["3"]),
    (&[(3, 6)], &["22", "33"]),
    (&[(4, 1)], &["2⁻0⁻"]),
    (&[(4, 2)], &["2⁻1⁻"]),
    (&[(4, 3), (6, 4)], &["2⁻"]),
    (&[(4, 4)], &["22⁻", "2⁻2"]),
    (&[(4, 5)], &["23⁻", "2⁻3"]),
    (&[(5, 1)], &["3⁻0⁻"]),
    (&[(5, 2)], &["3⁻1⁻"]),
    (&[(5, 3), (6, 5)], &["3⁻"]),
    (&[(5, 4)], &["32⁻", "3⁻2"]),
    (&[(5, 5)], &["33⁻", "3⁻3"]),
    (&[(6, 3)], &["2⁻2⁻", "3⁻3⁻"]),
    (&[(6, 6)], &["2⁻2", "3⁻3"]),
];

/// Sorted depth-four blocks of the diamonds.
const DIAMONDS_K4: &[(&[(u32, u32)], &[&str])] = &[
    (
        &[(0, 0)],
        &[
            "00⁻", "11⁻", "000⁻0⁻", "001⁻1⁻", "00⁻00⁻", "00⁻11⁻", "110⁻0⁻", "111⁻1⁻", "11⁻00⁻",
            "11⁻11⁻",
        ],
    ),
    (&[(0, 1)], &["0", "000⁻", "00⁻0", "110⁻", "11⁻0"]),
    (&[(0, 2)], &["1", "001⁻", "00⁻1", "111⁻", "11⁻1"]),
    (
        &[(0, 3)],
        &[
            "00", "11", "000⁻0", "001⁻1", "0022⁻", "0033⁻", "00⁻00", "00⁻11", "110⁻0", "111⁻1",
            "1122⁻", "1133⁻", "11⁻00", "11⁻11",
        ],
    ),
    (&[(0, 4)], &["002", "112"]),
    (&[(0, 5)], &["003", "113"]),
    (&[(0, 6)], &["0022", "0033", "1122", "1133"]),
    (&[(1, 0)], &["0⁻", "00⁻0⁻", "01⁻1⁻", "0⁻00⁻", "0⁻11⁻"]),
    (
        &[(1, 1)],
        &[
            "00⁻", "0⁻0", "00⁻00⁻", "00⁻0⁻0", "01⁻10⁻", "01⁻1⁻0", "022⁻0⁻", "033⁻0⁻", "0⁻000⁻",
            "0⁻00⁻0", "0⁻110⁻", "0⁻11⁻0",
        ],
    ),
    (
        &[(1, 2)],
        &[
            "01⁻", "0⁻1", "00⁻01⁻", "00⁻0⁻1", "01⁻11⁻", "01⁻1⁻1", "022⁻1⁻", "033⁻1⁻", "0⁻001⁻",
            "0⁻00⁻1", "0⁻111⁻", "0⁻11⁻1",
        ],
    ),
    (&[(1, 3)], &["0", "00⁻0", "01⁻1", "022⁻", "033⁻", "0⁻00", "0⁻11"]),
    (&[(1, 4)], &["02", "00⁻02", "01⁻12", "0222⁻", "022⁻2", "0332⁻", "033⁻2", "0⁻002", "0⁻112"]),
    (&[(1, 5)], &["03", "00⁻03", "01⁻13", "0223⁻", "022⁻3", "0333⁻", "033⁻3", "0⁻003", "0⁻113"]),
    (&[(1, 6)], &["022", "033"]),
    (&[(2, 0)], &["1⁻", "10⁻0⁻", "11⁻1⁻", "1⁻00⁻", "1⁻11⁻"]),
    (
        &[(2, 1)],
        &[
            "10⁻", "1⁻0", "10⁻00⁻", "10⁻0⁻0", "11⁻10⁻", "11⁻1⁻0", "122⁻0⁻", "133⁻0⁻", "1⁻000⁻",
            "1⁻00⁻0", "1⁻110⁻", "1⁻11⁻0",
        ],
    ),
    (
        &[(2, 2)],
        &[
            "11⁻", "1⁻1", "10⁻01⁻", "10⁻0⁻1", "11⁻11⁻", "11⁻1⁻1", "122⁻1⁻", "133⁻1⁻", "1⁻001⁻",
            "1⁻00⁻1", "1⁻111⁻", "1⁻11⁻1",
        ],
    ),
    (&[(2, 3)], &["1", "10⁻0", "11⁻1", "122⁻", "133⁻", "1⁻00", "1⁻11"]),
    (&[(2, 4)], &["12", "10⁻02", "11⁻12", "1222⁻", "122⁻2", "1332⁻", "133⁻2", "1⁻002", "1⁻112"]),
    (&[(2, 5)], &["13", "10⁻03", "11⁻13", "1223⁻", "122⁻3", "1333⁻", "133⁻3", "1⁻003", "1⁻113"]),
    (&[(2, 6)], &["122", "133"]),
    (
        &[(3, 0)],
        &[
            "0⁻0⁻", "1⁻1⁻", "0⁻00⁻0⁻", "0⁻01⁻1⁻", "0⁻0⁻00⁻", "0⁻0⁻11⁻", "1⁻10⁻0⁻", "1⁻11⁻1⁻",
            "1⁻1⁻00⁻", "1⁻1⁻11⁻", "22⁻0⁻0⁻", "22⁻1⁻1⁻", "33⁻0⁻0⁻", "33⁻1⁻1⁻",
        ],
    ),
    (&[(3, 1)], &["0⁻", "0⁻00⁻", "0⁻0⁻0", "1⁻10⁻", "1⁻1⁻0", "22⁻0⁻", "33⁻0⁻"]),
    (&[(3, 2)], &["1⁻", "0⁻01⁻", "0⁻0⁻1", "1⁻11⁻", "1⁻1⁻1", "22⁻1⁻", "33⁻1⁻"]),
    (
        &[(3, 3)],
        &[
            "0⁻0", "1⁻1", "22⁻", "33⁻", "0⁻00⁻0", "0⁻01⁻1", "0⁻022⁻", "0⁻033⁻", "0⁻0⁻00", "0⁻0⁻11",
            "1⁻10⁻0", "1⁻11⁻1", "1⁻122⁻", "1⁻133⁻", "1⁻1⁻00", "1⁻1⁻11", "222⁻2⁻", "223⁻3⁻",
            "22⁻0⁻0", "22⁻1⁻1", "22⁻22⁻", "22⁻33⁻", "332⁻2⁻", "333⁻3⁻", "33⁻0⁻0", "33⁻1⁻1",
            "33⁻22⁻", "33⁻33⁻",
        ],
    ),
    (&[(3, 4)], &["2", "0⁻02", "1⁻12", "222⁻", "22⁻2", "332⁻", "33⁻2"]),
    (&[(3, 5)], &["3", "0⁻03", "1⁻13", "223⁻", "22⁻3", "333⁻", "33⁻3"]),
    (
        &[(3, 6)],
        &[
            "22", "33", "0⁻022", "0⁻033", "1⁻122", "1⁻133", "222⁻2", "223⁻3", "22⁻22", "22⁻33",
            "332⁻2", "333⁻3", "33⁻22", "33⁻33",
        ],
    ),
    (&[(4, 0)], &["2⁻0⁻0⁻", "2⁻1⁻1⁻"]),
    (
        &[(4, 1)],
        &[
            "2⁻0⁻", "22⁻2⁻0⁻", "23⁻3⁻0⁻", "2⁻0⁻00⁻", "2⁻0⁻0⁻0", "2⁻1⁻10⁻", "2⁻1⁻1⁻0", "2⁻22⁻0⁻",
            "2⁻33⁻0⁻",
        ],
    ),
    (
        &[(4, 2)],
        &[
            "2⁻1⁻", "22⁻2⁻1⁻", "23⁻3⁻1⁻", "2⁻0⁻01⁻", "2⁻0⁻0⁻1", "2⁻1⁻11⁻", "2⁻1⁻1⁻1", "2⁻22⁻1⁻",
            "2⁻33⁻1⁻",
        ],
    ),
    (&[(4, 3)], &["2⁻", "22⁻2⁻", "23⁻3⁻", "2⁻0⁻0", "2⁻1⁻1", "2⁻22⁻", "2⁻33⁻"]),
    (
        &[(4, 4)],
        &[
            "22⁻", "2⁻2", "22⁻22⁻", "22⁻2⁻2", "23⁻32⁻", "23⁻3⁻2", "2⁻0⁻02", "2⁻1⁻12", "2⁻222⁻",
            "2⁻22⁻2", "2⁻332⁻", "2⁻33⁻2",
        ],
    ),
    (
        &[(4, 5)],
        &[
            "23⁻", "2⁻3", "22⁻23⁻", "22⁻2⁻3", "23⁻33⁻", "23⁻3⁻3", "2⁻0⁻03", "2⁻1⁻13", "2⁻223⁻",
            "2⁻22⁻3", "2⁻333⁻", "2⁻33⁻3",
        ],
    ),
    (&[(4, 6)], &["2", "22⁻2", "23⁻3", "2⁻22", "2⁻33"]),
    (&[(5, 0)], &["3⁻0⁻0⁻", "3⁻1⁻1⁻"]),
    (
        &[(5, 1)],
        &[
            "3⁻0⁻", "32⁻2⁻0⁻", "33⁻3⁻0⁻", "3⁻0⁻00⁻", "3⁻0⁻0⁻0", "3⁻1⁻10⁻", "3⁻1⁻1⁻0", "3⁻22⁻0⁻",
            "3⁻33⁻0⁻",
        ],
    ),
    (
        &[(5, 2)],
        &[
            "3⁻1⁻", "32⁻2⁻1⁻", "33⁻3⁻1⁻", "3⁻0⁻01⁻", "3⁻0⁻0⁻1", "3⁻1⁻11⁻", "3⁻1⁻1⁻1", "3⁻22⁻1⁻",
            "3⁻33⁻1⁻",
        ],
    ),
    (&[(5, 3)], &["3⁻", "32⁻2⁻", "33⁻3⁻", "3⁻0⁻0", "3⁻1⁻1", "3⁻22⁻", "3⁻33⁻"]),
    (
        &[(5, 4)],
        &[
            "32⁻", "3⁻2", "32⁻22⁻", "32⁻2⁻2", "33⁻32⁻", "33⁻3⁻2", "3⁻0⁻02", "3⁻1⁻12", "3⁻222⁻",
            "3⁻22⁻2", "3⁻332⁻", "3⁻33⁻2",
        ],
    ),
    (
        &[(5, 5)],
        &[
            "33⁻", "3⁻3", "32⁻23⁻", "32⁻2⁻3", "33⁻33⁻", "33⁻3⁻3", "3⁻0⁻03", "3⁻1⁻13", "3⁻223⁻",
            "3⁻22⁻3", "3⁻333⁻", "3⁻33⁻3",
        ],
    ),
    (&[(5, 6)], &["3", "32⁻2", "33⁻3", "3⁻22", "3⁻33"]),
    (&[(6, 0)], &["2⁻2⁻0⁻0⁻", "2⁻2⁻1⁻1⁻", "3⁻3⁻0⁻0⁻", "3⁻3⁻1⁻1⁻"]),
    (&[(6, 1)], &["2⁻2⁻0⁻", "3⁻3⁻0⁻"]),
    (&[(6, 2)], &["2⁻2⁻1⁻", "3⁻3⁻1⁻"]),
    (
        &[(6, 3)],
        &[
            "2⁻2⁻", "3⁻3⁻", "2⁻22⁻2⁻", "2⁻23⁻3⁻", "2⁻2⁻0⁻0", "2⁻2⁻1⁻1", "2⁻2⁻22⁻", "2⁻2⁻33⁻",
            "3⁻32⁻2⁻", "3⁻33⁻3⁻", "3⁻3⁻0⁻0", "3⁻3⁻1⁻1", "3⁻3⁻22⁻", "3⁻3⁻33⁻",
        ],
    ),
    (&[(6, 4)], &["2⁻", "2⁻22⁻", "2⁻2⁻2", "3⁻32⁻", "3⁻3⁻2"]),
    (&[(6, 5)], &["3⁻", "2⁻23⁻", "2⁻2⁻3", "3⁻33⁻", "3⁻3⁻3"]),
    (
        &[(6, 6)],
        &[
            "2⁻2", "3⁻3", "2⁻22⁻2", "2⁻23⁻3", "2⁻2⁻22", "2⁻2⁻33", "3⁻32⁻2", "3⁻33⁻3", "3⁻3⁻22",
            "3⁻3⁻33",
        ],
    ),
];

// =============================================================================
// TIER T0: BIT CODEC
// =============================================================================

mod t0_bit_codec {
    use super::*;

    /// T0.1: Three bits land in the top of the first byte.
    #[test]
    fn short_write_is_msb_first() {
        let mut writer = BitWriter::new(64);
        writer.write(0b110, 3).expect("write");
        assert_eq!(writer.data()[0], 0xC0);
        assert_eq!(writer.position(), 3);
    }

    /// T0.2: A 32-bit write straddling bytes keeps earlier bits intact.
    #[test]
    fn straddling_write_splits_across_bytes() {
        let mut writer = BitWriter::new(64);
        writer.write(0b110, 3).expect("write");
        writer.write(0xFFFF_FFFF, 32).expect("write");
        assert_eq!(
            writer.data(),
            &[0xDF, 0xFF, 0xFF, 0xFF, 0xE0, 0x00, 0x00, 0x00]
        );
    }

    /// T0.3: Writing past capacity is reported.
    #[test]
    fn overflow_is_an_error() {
        let mut writer = BitWriter::new(8);
        writer.write(0, 6).expect("write");
        assert!(matches!(
            writer.write(0, 3),
            Err(IndexError::BitOverflow {
                capacity: 8,
                requested: 9
            })
        ));
    }

    /// T0.4: Reading with the same widths returns the written values.
    #[test]
    fn reader_inverts_writer() {
        let fields = [(5u32, 3u32), (1023, 10), (0, 1), (0xDEAD_BEEF, 32), (17, 5)];
        let total: u32 = fields.iter().map(|(_, w)| w).sum();
        let mut writer = BitWriter::new(total as usize);
        for (value, width) in fields {
            writer.write(value, width).expect("write");
        }

        let bytes = writer.into_bytes();
        let mut reader = BitReader::new(&bytes);
        for (value, width) in fields {
            assert_eq!(reader.read(width).expect("read"), value);
        }
    }
}

// =============================================================================
// TIER T1: GRAPH INPUT
// =============================================================================

mod t1_graph_input {
    use super::*;
    use std::collections::BTreeSet;

    /// T1.1: Header and edges are read; isolated vertices count.
    #[test]
    fn reads_header_and_edges() {
        let graph = Ingestor::read_graph_str("5 1 2\n0 1 1\n").expect("graph");
        assert_eq!(graph.vertex_count(), 5);
        assert_eq!(graph.label_count(), 2);
        assert_eq!(graph.edge_count(), 1);
    }

    /// T1.2: Repeated edges collapse.
    #[test]
    fn duplicate_edges_collapse() {
        let graph = Ingestor::read_graph_str("2 3 1\n0 1 0\n0 1 0\n0 1 0\n").expect("graph");
        assert_eq!(graph.edge_count(), 1);
    }

    /// T1.3: Malformed lines fail with the line number.
    #[test]
    fn malformed_input_rejected() {
        for (text, line) in [
            ("", 1),
            ("2 1\n", 1),
            ("2 1 1\n0 x 0\n", 2),
            ("2 1 1\n0 2 0\n", 2),
            ("2 2 1\n0 1 0\n1 0 1\n", 3),
            ("2 1 1\n0 1 0 4\n", 2),
        ] {
            let result = Ingestor::read_graph_str(text);
            assert!(
                matches!(result, Err(IndexError::Format { line: got, .. }) if got == line),
                "{:?} gave {:?}",
                text,
                result
            );
        }
    }

    /// T1.4: A label filter drops edges but keeps vertices.
    #[test]
    fn label_filter_keeps_allowed_edges() {
        let allowed: BTreeSet<u32> = [2, 3].into_iter().collect();
        let graph = Ingestor::read_graph_filtered(DIAMONDS.as_bytes(), Some(&allowed))
            .expect("graph");
        assert_eq!(graph.vertex_count(), 7);
        assert_eq!(graph.edge_count(), 4);
        assert_eq!(graph.used_labels(), allowed);
    }
}

// =============================================================================
// TIER T2: CANONICAL FORMS
// =============================================================================

mod t2_canonical_forms {
    use super::*;
    use cpqindex_core::{CanonEngine, CanonForm};

    fn canon(engine: &CanonEngine, text: &str) -> CanonForm {
        engine
            .canonicalize(&Cpq::parse(text).expect("parse"), false)
            .expect("canon")
    }

    /// T2.1: Intersection operand order does not change the form.
    #[test]
    fn intersection_is_unordered() {
        let engine = CanonEngine::with_threads(2, None).expect("engine");
        let a = canon(&engine, "(0◦1) ∩ (2◦3)");
        let b = canon(&engine, "(2◦3) ∩ (0◦1)");
        assert_eq!(a.to_binary_canon(), b.to_binary_canon());
        assert_eq!(a, b);
    }

    /// T2.2: Homomorphically equivalent queries share a form.
    #[test]
    fn equivalent_queries_collapse() {
        let engine = CanonEngine::with_threads(1, None).expect("engine");
        assert_eq!(canon(&engine, "0 ∩ 0"), canon(&engine, "0"));
        assert_eq!(
            canon(&engine, "((0◦1) ∩ (0◦1)) ∩ id"),
            canon(&engine, "(0◦1) ∩ id")
        );
    }

    /// T2.3: Direction, labels and loops are all significant.
    #[test]
    fn distinct_queries_stay_distinct() {
        let engine = CanonEngine::with_threads(1, None).expect("engine");
        let forms = ["0", "0⁻", "1", "0◦1", "1◦0", "0 ∩ id", "(0◦0⁻) ∩ id", "0◦0⁻"]
            .map(|text| canon(&engine, text));
        for (i, a) in forms.iter().enumerate() {
            for b in &forms[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    /// T2.4: The binary form decodes back to the same structure.
    #[test]
    fn binary_form_decodes() {
        let engine = CanonEngine::with_threads(1, None).expect("engine");
        let form = canon(&engine, "(0◦2) ∩ (0◦1)");
        let decoded = CanonForm::from_binary(form.to_binary_canon()).expect("decode");
        assert_eq!(decoded, form);
        assert_eq!(decoded.to_string_canon(), form.to_string_canon());
        assert_eq!(decoded.graph(), form.graph());
    }

    /// T2.5: A single edge has a fixed encoding.
    #[test]
    fn single_label_string_form() {
        let engine = CanonEngine::with_threads(1, None).expect("engine");
        let form = canon(&engine, "3");
        assert_eq!(form.to_string_canon(), "s=0,t=1,l3=1,e0={2},e1={},e2={1}");
    }
}

// =============================================================================
// TIER T3: BISIMULATION LAYERS
// =============================================================================

mod t3_layers {
    use super::*;
    use cpqindex_core::Partition;

    /// T3.1: Depth zero is rejected before any work.
    #[test]
    fn zero_depth_rejected() {
        assert!(matches!(
            Partition::build(&diamonds(), 0, &NoProgress),
            Err(IndexError::InvalidArgument(_))
        ));
        assert!(matches!(
            Index::build(&diamonds(), &IndexOptions::new(0), &NoProgress),
            Err(IndexError::InvalidArgument(_))
        ));
    }

    /// T3.2: Every sequence at layer i has length i + 1.
    #[test]
    fn sequence_length_matches_layer() {
        let partition = Partition::build(&diamonds(), 4, &NoProgress).expect("partition");
        for layer in 0..4 {
            for segment in partition.layer(layer) {
                assert!(!segment.labels().is_empty());
                assert!(segment.labels().iter().all(|s| s.len() == layer + 1));
            }
        }
    }

    /// T3.3: Runs are contiguous and ids never repeat across runs.
    #[test]
    fn runs_are_contiguous() {
        let partition = Partition::build(&diamonds(), 4, &NoProgress).expect("partition");
        let mut seen = std::collections::BTreeSet::new();
        for layer in 0..4 {
            for run in partition.runs(layer) {
                assert!(seen.insert(run[0].id()), "id {} reused", run[0].id());
                assert!(run.iter().all(|s| s.is_loop() == run[0].is_loop()));
            }
        }
    }
}

// =============================================================================
// TIER T4: BLOCKS
// =============================================================================

mod t4_blocks {
    use super::*;

    /// T4.1: Depth two produces the known 31 blocks.
    #[test]
    fn depth_two_listing() {
        let index = sorted_index(&IndexOptions::new(2));
        assert_eq!(listing(&index), expected(DIAMONDS_K2));
    }

    /// T4.2: Depth four produces the known 49 blocks.
    #[test]
    fn depth_four_listing() {
        let index = sorted_index(&IndexOptions::new(4));
        assert_eq!(index.blocks().len(), 49);
        assert_eq!(listing(&index), expected(DIAMONDS_K4));
    }

    /// T4.3: The loop at vertex 0 keeps exactly its ten loop sequences.
    #[test]
    fn origin_loop_block() {
        let index = sorted_index(&IndexOptions::new(4));
        let block = index
            .blocks()
            .iter()
            .find(|b| b.pairs().contains(&Pair::new(0, 0)))
            .expect("block");
        assert_eq!(block.pairs(), &[Pair::new(0, 0)]);
        assert!(block.is_loop());
        assert_eq!(block.labels().len(), 10);
    }

    /// T4.4: Edge input order does not change the blocks.
    #[test]
    fn input_order_independent() {
        let mut lines: Vec<&str> = DIAMONDS.lines().collect();
        lines[1..].reverse();
        let reversed = Ingestor::read_graph_str(&lines.join("\n")).expect("graph");

        let mut a = Index::build(&reversed, &IndexOptions::new(3), &NoProgress).expect("index");
        a.sort();
        let b = sorted_index(&IndexOptions::new(3));
        assert_eq!(listing(&a), listing(&b));
    }
}

// =============================================================================
// TIER T5: CORES
// =============================================================================

mod t5_cores {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    /// Labels correctly for `healthy` requests, then fails every one.
    struct Failing {
        healthy: usize,
        calls: AtomicUsize,
    }

    impl CanonicalLabeler for Failing {
        fn canonical_labeling(
            &self,
            adjacency: &[Vec<u32>],
            colors: &[i32],
            cancel: &AtomicBool,
        ) -> Result<Vec<u32>, IndexError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) < self.healthy {
                RefinementLabeler.canonical_labeling(adjacency, colors, cancel)
            } else {
                Err(IndexError::OracleFailure("labeler unavailable".to_string()))
            }
        }
    }

    /// Never answers; gives up once cancelled.
    struct Stalled;

    impl CanonicalLabeler for Stalled {
        fn canonical_labeling(
            &self,
            _adjacency: &[Vec<u32>],
            _colors: &[i32],
            cancel: &AtomicBool,
        ) -> Result<Vec<u32>, IndexError> {
            while !cancel.load(Ordering::Relaxed) {
                std::thread::sleep(Duration::from_millis(2));
            }
            Err(IndexError::OracleCancelled)
        }
    }

    fn engine_with(labeler: Arc<dyn CanonicalLabeler>, timeout: Option<Duration>) -> CanonEngine {
        let pool = LabelingPool::new(LabelingPoolConfig::with_threads(2), labeler).expect("pool");
        CanonEngine::new(pool, timeout)
    }

    fn failing(healthy: usize) -> Arc<dyn CanonicalLabeler> {
        Arc::new(Failing {
            healthy,
            calls: AtomicUsize::new(0),
        })
    }

    fn cores_of(index: &Index, pair: Pair) -> usize {
        index
            .blocks()
            .iter()
            .find(|b| b.pairs().contains(&pair))
            .map(|b| b.cores().len())
            .expect("block")
    }

    /// T5.1: Core counts at depth two.
    #[test]
    fn depth_two_core_counts() {
        let index = sorted_index(&IndexOptions::new(2).with_cores(true).with_threads(2));
        assert_eq!(cores_of(&index, Pair::new(0, 0)), 6);
        assert_eq!(cores_of(&index, Pair::new(0, 3)), 3);
        assert_eq!(cores_of(&index, Pair::new(3, 3)), 30);
        assert_eq!(cores_of(&index, Pair::new(1, 4)), 1);
        assert_eq!(cores_of(&index, Pair::new(4, 6)), 1);
    }

    /// T5.2: Core sets do not depend on the number of labeling threads.
    #[test]
    fn cores_independent_of_threads() {
        let one = sorted_index(&IndexOptions::new(2).with_cores(true).with_threads(1));
        let four = sorted_index(&IndexOptions::new(2).with_cores(true).with_threads(4));
        for (a, b) in one.blocks().iter().zip(four.blocks()) {
            assert_eq!(a.pairs(), b.pairs());
            assert_eq!(a.core_hashes(), b.core_hashes());
        }
        assert_eq!(one.unique_cores(), four.unique_cores());
    }

    /// T5.3: A core found in a block maps back to it.
    #[test]
    fn core_map_points_back() {
        let index = sorted_index(&IndexOptions::new(2).with_cores(true));
        for block in index.blocks() {
            for core in block.cores() {
                assert!(
                    index
                        .blocks_for_core(core.hash())
                        .any(|b| b.pairs() == block.pairs())
                );
            }
        }
    }

    /// T5.4: A labeling failure aborts the build.
    #[test]
    fn oracle_failure_aborts_build() {
        let options = IndexOptions::new(2).with_cores(true);
        let engine = engine_with(failing(0), None);
        let result = Index::build_with_engine(&diamonds(), &options, &engine, &NoProgress);
        assert!(matches!(result, Err(IndexError::OracleFailure(_))));
    }

    /// T5.5: A failure after some blocks succeeded still yields no index.
    #[test]
    fn late_oracle_failure_aborts_build() {
        let options = IndexOptions::new(2).with_cores(true);
        let engine = engine_with(failing(20), None);
        let result = Index::build_with_engine(&diamonds(), &options, &engine, &NoProgress);
        assert!(matches!(result, Err(IndexError::OracleFailure(_))));
    }

    /// T5.6: A stalled oracle surfaces as a timeout.
    #[test]
    fn oracle_timeout_aborts_build() {
        let options = IndexOptions::new(2).with_cores(true);
        let engine = engine_with(Arc::new(Stalled), Some(Duration::from_millis(20)));
        let result = Index::build_with_engine(&diamonds(), &options, &engine, &NoProgress);
        assert!(matches!(result, Err(IndexError::OracleTimeout(_))));
    }

    /// T5.7: Without cores the engine is never consulted.
    #[test]
    fn engine_unused_without_cores() {
        let engine = engine_with(failing(0), None);
        let options = IndexOptions::new(2);
        let index =
            Index::build_with_engine(&diamonds(), &options, &engine, &NoProgress).expect("index");
        assert_eq!(index.blocks().len(), 31);
        assert!(!index.has_cores());
        assert_eq!(engine.pool().metrics().submitted.load(Ordering::Relaxed), 0);
    }

    /// T5.8: A supplied engine gives the same cores as the built-in one.
    #[test]
    fn supplied_engine_matches_builtin() {
        let options = IndexOptions::new(2).with_cores(true);
        let engine = engine_with(Arc::new(RefinementLabeler), None);
        let mut supplied =
            Index::build_with_engine(&diamonds(), &options, &engine, &NoProgress).expect("index");
        supplied.sort();
        let builtin = sorted_index(&options);
        for (a, b) in supplied.blocks().iter().zip(builtin.blocks()) {
            assert_eq!(a.core_hashes(), b.core_hashes());
        }
        assert!(engine.pool().metrics().completed.load(Ordering::Relaxed) > 0);
    }
}
