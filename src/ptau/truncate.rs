//! Cut a ceremony file down to a smaller power.
//!
//! The prefix of every point section is still a valid accumulator for the
//! lower power, and Lagrange levels `0..=power` sit at the front of sections
//! 12–15, so truncation is a prefix copy. The header keeps the original
//! ceremony power; the hash chain can then no longer be recomputed from the
//! stored points and verification says so.

#![forbid(unsafe_code)]

use std::io::{Read, Seek, Write};

use tracing::info;

use super::{
    chunks, lagrange_offset, phase2::LAGRANGE_SECTIONS, read_info, section_group, section_points,
    write_header, PointGroup, PtauError, POINT_SECTIONS, PTAU_MAGIC, PTAU_VERSION, SEC_CONTRIBUTIONS,
};
use crate::binfile::{copy_section, BinReader, BinWriter};
use crate::codec::CurveCodec;
use crate::curve::PairingCurve;

/// Rewrite `r` at `power`, which must not exceed the file's power.
pub fn truncate<E: PairingCurve, R: Read + Seek, W: Write + Seek>(
    r: &mut BinReader<R>,
    out: W,
    power: u32,
) -> Result<W, PtauError> {
    let info = read_info::<E, R>(r)?;
    if power == 0 || power > info.header.power {
        return Err(PtauError::BadPower { power, max: info.header.power });
    }
    let codec = CurveCodec::<E>::new();
    let mut w = BinWriter::new(out, PTAU_MAGIC, PTAU_VERSION)?;
    write_header::<E, W>(&mut w, power, info.header.ceremony_power)?;

    let point_size = |id: u32| match section_group(id) {
        PointGroup::G1 => codec.g1_size(),
        PointGroup::G2 => codec.g2_size(),
    };
    for id in POINT_SECTIONS {
        copy_prefix(r, &mut w, id, section_points(id, power), point_size(id))?;
    }
    copy_section(r, &mut w, SEC_CONTRIBUTIONS)?;
    for (_, lag) in LAGRANGE_SECTIONS {
        if r.has_section(lag) {
            copy_prefix(r, &mut w, lag, lagrange_offset(power + 1), point_size(lag))?;
        }
    }

    info!(from = info.header.power, to = power, "truncated powers of tau");
    Ok(w.finish()?)
}

fn copy_prefix<R: Read + Seek, W: Write + Seek>(
    r: &mut BinReader<R>,
    w: &mut BinWriter<W>,
    id: u32,
    points: usize,
    point_size: usize,
) -> Result<(), PtauError> {
    let sz = point_size as u64;
    w.start_section(id)?;
    for (start, len) in chunks(points) {
        w.write_bytes(&r.read_section_range(id, start as u64 * sz, len as u64 * sz)?)?;
    }
    w.end_section()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::super::testutil::*;
    use super::super::*;
    use super::*;
    use crate::curve::Bn254;
    use std::io::Cursor;

    #[test]
    fn truncated_prepared_file_verifies() {
        let mut r = reader(prepared::<Bn254>(3));
        let bytes = truncate::<Bn254, _, _>(&mut r, Cursor::new(Vec::new()), 2).unwrap().into_inner();
        let mut r = reader(bytes);
        let info = read_info::<Bn254, _>(&mut r).unwrap();
        assert_eq!(info.header.power, 2);
        assert_eq!(info.header.ceremony_power, 3);
        assert_eq!(info.contributions.len(), 1);

        let codec = CurveCodec::<Bn254>::new();
        assert_eq!(r.section_size(SEC_TAU_G1).unwrap(), 7 * codec.g1_size() as u64);
        assert_eq!(r.section_size(SEC_LAGRANGE_TAU_G2).unwrap(), 7 * codec.g2_size() as u64);
        assert!(verify::verify::<Bn254, _>(&mut r).unwrap());
    }

    #[test]
    fn contributing_after_truncation_keeps_the_chain() {
        let mut r = reader(fresh::<Bn254>(3));
        let small = truncate::<Bn254, _, _>(&mut r, Cursor::new(Vec::new()), 2).unwrap().into_inner();
        let mut r = reader(small);
        let bytes = contribute::beacon::<Bn254, _, _>(&mut r, Cursor::new(Vec::new()), b"after", 1, None)
            .unwrap()
            .0
            .into_inner();
        let mut r = reader(bytes);
        assert!(verify::verify::<Bn254, _>(&mut r).unwrap());
    }

    #[test]
    fn rejects_larger_power() {
        let mut r = reader(fresh::<Bn254>(2));
        assert!(matches!(
            truncate::<Bn254, _, _>(&mut r, Cursor::new(Vec::new()), 3),
            Err(PtauError::BadPower { power: 3, max: 2 })
        ));
    }
}
