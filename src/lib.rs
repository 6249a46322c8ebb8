//! Crate root: public surface and protocol-wide conventions
//!
//! `zkforge` runs Powers-of-Tau ceremonies and builds, proves and verifies
//! Groth16, PLONK and FFLONK circuits on BN254 and BLS12-381, reading and
//! writing the `ptau`, `zkey`, `wtns` and `r1cs` section files and JSON
//! proofs and verification keys.
//!
//! ## Conventions
//!
//! - **Curves.** Every file records its base-field prime `q`; the curve is
//!   detected from it ([`CurveId::from_q`]) and all generic code is
//!   instantiated through [`with_curve!`] over a [`PairingCurve`].
//!
//! - **Encodings.** Points and scalars inside `ptau` and `zkey` files are
//!   little-endian Montgomery. Hashes and transcripts see uncompressed
//!   big-endian points. JSON carries decimal strings. See [`codec`].
//!
//! - **Domains.** `ω` of order `m` is `g^((r−1)/m)` for the field's
//!   multiplicative generator `g`, so roots of different orders nest
//!   (`ω_{4n}⁴ = ω_n`, `ω_{3n}³ = ω_n`).
//!
//! - **Bounded buffers.** Ceremony and setup passes stream points in chunks
//!   of [`config::Settings::chunk_points`]; no pass holds a whole
//!   `2^power` section of a large ceremony in memory at once.
//!
//! - **Failure modes.** Malformed or inconsistent inputs are `Err`.
//!   Failing soundness checks (pairings, hash chains, tampered proofs) are
//!   `Ok(false)` with the reason logged through `tracing`.

#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]

/// Environment-driven runtime settings.
pub mod config;
/// Supported curves and curve detection.
pub mod curve;
/// LEM, uncompressed and JSON encodings of fields and points.
pub mod codec;
/// Framed binary section files and all-or-nothing file output.
pub mod binfile;
/// Paged vector for large coefficient and gate tables.
pub mod paged;
/// Evaluation domains, roots of unity and radix-2 transforms.
pub mod domain;
/// Coefficient-form polynomial helpers.
pub mod polynomial;
/// Quotients by `X^m − c` and split evaluations over the `4n` domain.
pub mod quotient;
/// KZG commitments, MSM and pairing checks.
pub mod pcs;
/// Keccak-256 Fiat–Shamir transcript and the Blake2b ceremony hash chain.
pub mod transcript;
/// Contribution keys, beacon randomness and parameter blocks.
pub mod keypair;
/// `.r1cs` reader and writer.
pub mod r1cs;
/// `.wtns` reader and writer.
pub mod wtns;
/// Powers-of-Tau ceremony.
pub mod ptau;
/// Shared `.zkey` structure and protocol errors.
pub mod zkey;
/// Groth16 setup, phase-2 MPC, prover and verifier.
pub mod groth16;
/// PLONK setup, prover and verifier.
pub mod plonk;
/// FFLONK setup, prover and verifier.
pub mod fflonk;

// ============================================================================
// Root-level re-exports
// ============================================================================

pub use crate::binfile::{BinError, BinReader, BinWriter, PendingFile};
pub use crate::curve::{Bls12_381, Bn254, CurveError, CurveId, Fr, PairingCurve};
pub use crate::zkey::{Protocol, ProtocolError};
