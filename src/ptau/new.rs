//! Fresh accumulator: every point section filled with the generators.

#![forbid(unsafe_code)]

use std::io::{Seek, Write};

use ark_ec::{CurveGroup, Group};
use tracing::info;

use super::{
    chunks, first_challenge, max_power, section_group, section_points, write_contributions, write_header,
    PointGroup, PtauError, POINT_SECTIONS, PTAU_MAGIC, PTAU_VERSION,
};
use crate::binfile::BinWriter;
use crate::codec::CurveCodec;
use crate::curve::{G1Projective, G2Projective, PairingCurve};
use crate::transcript::format_hash;

/// Write a power-`power` accumulator with no contributions.
///
/// Returns the writer and the challenge the first contributor answers.
pub fn new_accumulator<E: PairingCurve, W: Write + Seek>(
    out: W,
    power: u32,
) -> Result<(W, [u8; 64]), PtauError> {
    if power == 0 || power > max_power::<E>() {
        return Err(PtauError::BadPower { power, max: max_power::<E>() });
    }
    let codec = CurveCodec::<E>::new();
    let mut w = BinWriter::new(out, PTAU_MAGIC, PTAU_VERSION)?;
    write_header::<E, W>(&mut w, power, power)?;

    let mut g1 = Vec::new();
    codec.write_g1_lem(&G1Projective::<E>::generator().into_affine(), &mut g1);
    let mut g2 = Vec::new();
    codec.write_g2_lem(&G2Projective::<E>::generator().into_affine(), &mut g2);

    for id in POINT_SECTIONS {
        let point = match section_group(id) {
            PointGroup::G1 => &g1,
            PointGroup::G2 => &g2,
        };
        w.start_section(id)?;
        for (_, len) in chunks(section_points(id, power)) {
            w.write_bytes(&point.repeat(len))?;
        }
        w.end_section()?;
    }
    write_contributions::<E, W>(&mut w, &[])?;

    let challenge = first_challenge::<E>(power);
    info!(curve = E::NAME, power, "new accumulator");
    info!("first challenge hash:\n\t\t{}", format_hash(&challenge));
    Ok((w.finish()?, challenge))
}

#[cfg(test)]
mod tests {
    use super::super::testutil::*;
    use super::super::*;
    use super::new_accumulator;
    use crate::curve::{Bls12_381, Bn254};

    #[test]
    fn sections_hold_generators() {
        let bytes = fresh::<Bn254>(3);
        let mut r = reader(bytes);
        let info = read_info::<Bn254, _>(&mut r).unwrap();
        assert_eq!(info.header.power, 3);
        assert_eq!(info.header.ceremony_power, 3);
        assert!(info.contributions.is_empty());

        let codec = CurveCodec::<Bn254>::new();
        assert_eq!(r.section_size(SEC_TAU_G1).unwrap(), 15 * codec.g1_size() as u64);
        let pts = read_g1_points(&mut r, &codec, SEC_TAU_G1, 0, 15).unwrap();
        let g = G1Projective::<Bn254>::generator().into_affine();
        assert!(pts.iter().all(|p| *p == g));
        let g2 = read_g2_points(&mut r, &codec, SEC_BETA_G2, 0, 1).unwrap();
        assert_eq!(g2[0], G2Projective::<Bn254>::generator().into_affine());
    }

    #[test]
    fn rejects_bad_power() {
        let out = std::io::Cursor::new(Vec::new());
        assert!(matches!(
            new_accumulator::<Bn254, _>(out, 0),
            Err(PtauError::BadPower { power: 0, .. })
        ));
        let out = std::io::Cursor::new(Vec::new());
        assert!(matches!(
            new_accumulator::<Bls12_381, _>(out, 33),
            Err(PtauError::BadPower { power: 33, max: 32 })
        ));
    }
}
