//! Chemistry compatibility predicate.
//!
//! Only P6/C4 data is accepted for now; the check is a pure function of the
//! read group's kit and basecaller metadata.

use crate::ccs::types::ReadGroupInfo;

const SEQUENCING_KIT_P6: &str = "100356200";
const BINDING_KITS_P6: [&str; 2] = ["100356300", "100372700"];

pub fn is_supported(read_group: &ReadGroupInfo) -> bool {
    let bc_ver: String = read_group.basecaller_version.chars().take(3).collect();

    BINDING_KITS_P6.contains(&read_group.binding_kit.as_str())
        && read_group.sequencing_kit == SEQUENCING_KIT_P6
        && (bc_ver == "2.1" || bc_ver == "2.3")
}
