//! Desikan-Killiany cortical parcellation, 68-region variant.
//!
//! Region order is fixed: 34 left-hemisphere labels followed by the same
//! 34 labels for the right hemisphere. Every result row, cache entry, and
//! metadata sidecar indexes regions by this order, so it must never be
//! reordered.

/// Number of cortical regions in the atlas.
pub const REGION_COUNT: usize = 68;

/// Atlas labels in canonical row order.
pub static DESIKAN_KILLIANY_68: [&str; REGION_COUNT] = [
    "bankssts-lh",
    "caudalanteriorcingulate-lh",
    "caudalmiddlefrontal-lh",
    "cuneus-lh",
    "entorhinal-lh",
    "fusiform-lh",
    "inferiorparietal-lh",
    "inferiortemporal-lh",
    "isthmuscingulate-lh",
    "lateraloccipital-lh",
    "lateralorbitofrontal-lh",
    "lingual-lh",
    "medialorbitofrontal-lh",
    "middletemporal-lh",
    "parahippocampal-lh",
    "paracentral-lh",
    "parsopercularis-lh",
    "parsorbitalis-lh",
    "parstriangularis-lh",
    "pericalcarine-lh",
    "postcentral-lh",
    "posteriorcingulate-lh",
    "precentral-lh",
    "precuneus-lh",
    "rostralanteriorcingulate-lh",
    "rostralmiddlefrontal-lh",
    "superiorfrontal-lh",
    "superiorparietal-lh",
    "superiortemporal-lh",
    "supramarginal-lh",
    "frontalpole-lh",
    "temporalpole-lh",
    "transversetemporal-lh",
    "insula-lh",
    "bankssts-rh",
    "caudalanteriorcingulate-rh",
    "caudalmiddlefrontal-rh",
    "cuneus-rh",
    "entorhinal-rh",
    "fusiform-rh",
    "inferiorparietal-rh",
    "inferiortemporal-rh",
    "isthmuscingulate-rh",
    "lateraloccipital-rh",
    "lateralorbitofrontal-rh",
    "lingual-rh",
    "medialorbitofrontal-rh",
    "middletemporal-rh",
    "parahippocampal-rh",
    "paracentral-rh",
    "parsopercularis-rh",
    "parsorbitalis-rh",
    "parstriangularis-rh",
    "pericalcarine-rh",
    "postcentral-rh",
    "posteriorcingulate-rh",
    "precentral-rh",
    "precuneus-rh",
    "rostralanteriorcingulate-rh",
    "rostralmiddlefrontal-rh",
    "superiorfrontal-rh",
    "superiorparietal-rh",
    "superiortemporal-rh",
    "supramarginal-rh",
    "frontalpole-rh",
    "temporalpole-rh",
    "transversetemporal-rh",
    "insula-rh",
];

/// Row index of a region label, if it exists in the atlas.
pub fn region_index(label: &str) -> Option<usize> {
    DESIKAN_KILLIANY_68.iter().position(|&r| r == label)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn atlas_has_sixty_eight_unique_labels() {
        let mut seen = std::collections::HashSet::new();
        for label in DESIKAN_KILLIANY_68 {
            assert!(seen.insert(label), "duplicate label {label}");
        }
        assert_eq!(seen.len(), REGION_COUNT);
    }

    #[test]
    fn hemispheres_mirror_each_other() {
        for i in 0..34 {
            let left = DESIKAN_KILLIANY_68[i];
            let right = DESIKAN_KILLIANY_68[i + 34];
            assert_eq!(left.strip_suffix("-lh"), right.strip_suffix("-rh"));
        }
    }

    #[test]
    fn canonical_positions_hold() {
        assert_eq!(DESIKAN_KILLIANY_68[0], "bankssts-lh");
        assert_eq!(DESIKAN_KILLIANY_68[33], "insula-lh");
        assert_eq!(DESIKAN_KILLIANY_68[34], "bankssts-rh");
        assert_eq!(DESIKAN_KILLIANY_68[67], "insula-rh");
        assert_eq!(region_index("precuneus-rh"), Some(57));
        assert_eq!(region_index("hippocampus-lh"), None);
    }
}
