//! `zkforge` command line.
//!
//! ```text
//! zkforge ptau new <curve> <power> <out.ptau>
//! zkforge ptau contribute <in.ptau> <out.ptau> [--name N] [--entropy E]
//! zkforge ptau beacon <in.ptau> <out.ptau> <beaconHashHex> <numIterationsExp> [--name N]
//! zkforge ptau verify <in.ptau>
//! zkforge ptau prepare <in.ptau> <out.ptau>
//! zkforge ptau truncate <in.ptau> <power> <out.ptau>
//! zkforge ptau export-challenge <in.ptau> <challenge>
//! zkforge ptau challenge-contribute <curve> <challenge> <response> [--entropy E]
//! zkforge ptau import-response <in.ptau> <response> <out.ptau> [--name N]
//! zkforge setup <groth16|plonk|fflonk> <circuit.r1cs> <final.ptau> <out.zkey>
//! zkforge zkey contribute <in.zkey> <out.zkey> [--name N] [--entropy E]
//! zkforge zkey beacon <in.zkey> <out.zkey> <beaconHashHex> <numIterationsExp> [--name N]
//! zkforge zkey verify <circuit.r1cs> <final.ptau> <in.zkey>
//! zkforge zkey export-vkey <in.zkey> <vkey.json>
//! zkforge prove <in.zkey> <witness.wtns> <proof.json> <public.json>
//! zkforge verify <vkey.json> <public.json> <proof.json>
//! ```
//!
//! Outputs are written to a temporary file next to the target and moved
//! into place only once complete. `verify` commands exit with status 1 when
//! the check fails. Logging follows `RUST_LOG` (default `zkforge=info`).

#![forbid(unsafe_code)]

use std::{
    fs::File,
    io::{BufReader, BufWriter, Write},
};

use anyhow::{anyhow, bail, Context, Result};
use serde_json::Value;
use tracing::{error, info};
use zkforge::{
    binfile::{open_file, BinReader, PendingFile},
    curve::{CurveId, PairingCurve},
    fflonk, groth16, plonk, ptau,
    r1cs::{self, R1cs, R1CS_MAGIC, R1CS_VERSION},
    transcript::format_hash,
    with_curve,
    wtns::{self, WTNS_MAGIC, WTNS_VERSION},
    zkey::{self, Protocol},
};

const USAGE: &str = "usage: zkforge <ptau|setup|zkey|prove|verify> ... (see `zkforge help`)";

const HELP: &str = "\
zkforge ptau new <curve> <power> <out.ptau>
zkforge ptau contribute <in.ptau> <out.ptau> [--name N] [--entropy E]
zkforge ptau beacon <in.ptau> <out.ptau> <beaconHashHex> <numIterationsExp> [--name N]
zkforge ptau verify <in.ptau>
zkforge ptau prepare <in.ptau> <out.ptau>
zkforge ptau truncate <in.ptau> <power> <out.ptau>
zkforge ptau export-challenge <in.ptau> <challenge>
zkforge ptau challenge-contribute <curve> <challenge> <response> [--entropy E]
zkforge ptau import-response <in.ptau> <response> <out.ptau> [--name N]
zkforge setup <groth16|plonk|fflonk> <circuit.r1cs> <final.ptau> <out.zkey>
zkforge zkey contribute <in.zkey> <out.zkey> [--name N] [--entropy E]
zkforge zkey beacon <in.zkey> <out.zkey> <beaconHashHex> <numIterationsExp> [--name N]
zkforge zkey verify <circuit.r1cs> <final.ptau> <in.zkey>
zkforge zkey export-vkey <in.zkey> <vkey.json>
zkforge prove <in.zkey> <witness.wtns> <proof.json> <public.json>
zkforge verify <vkey.json> <public.json> <proof.json>";

type FileReader = BinReader<BufReader<File>>;

fn parse_flag(args: &[String], key: &str) -> Option<String> {
    let mut it = args.iter();
    while let Some(a) = it.next() {
        if a == key {
            return it.next().cloned();
        }
    }
    None
}

/// Arguments that are neither flags nor flag values.
fn positional(args: &[String]) -> Vec<&str> {
    let mut out = Vec::new();
    let mut it = args.iter();
    while let Some(a) = it.next() {
        if a.starts_with("--") {
            it.next();
        } else {
            out.push(a.as_str());
        }
    }
    out
}

fn arg<'a>(pos: &[&'a str], i: usize, what: &str) -> Result<&'a str> {
    pos.get(i).copied().ok_or_else(|| anyhow!("missing <{what}>\n{USAGE}"))
}

fn parse_u32(s: &str, what: &str) -> Result<u32> {
    s.parse::<u32>().with_context(|| format!("{what} must be a non-negative integer, got {s:?}"))
}

fn read_json(path: &str) -> Result<Value> {
    let f = File::open(path).with_context(|| format!("open {path}"))?;
    serde_json::from_reader(BufReader::new(f)).with_context(|| format!("parse {path}"))
}

fn write_json(path: &str, v: &Value) -> Result<()> {
    let mut w = BufWriter::new(PendingFile::create(path).with_context(|| format!("create {path}"))?);
    serde_json::to_writer_pretty(&mut w, v)?;
    w.write_all(b"\n")?;
    w.into_inner().map_err(|e| e.into_error())?.persist()?;
    Ok(())
}

// ============================================================================
// Curve detection
// ============================================================================

fn open_ptau(path: &str) -> Result<(FileReader, CurveId)> {
    let mut r = ptau::open(path).with_context(|| format!("open {path}"))?;
    let curve = ptau::read_header(&mut r)?.curve()?;
    Ok((r, curve))
}

fn open_zkey(path: &str) -> Result<(FileReader, Protocol, CurveId)> {
    let mut r = zkey::open(path).with_context(|| format!("open {path}"))?;
    let protocol = zkey::read_protocol(&mut r)?;
    let curve = zkey::read_curve(&mut r)?;
    Ok((r, protocol, curve))
}

fn open_r1cs(path: &str) -> Result<(FileReader, CurveId)> {
    let mut r = open_file(path, R1CS_MAGIC, R1CS_VERSION).with_context(|| format!("open {path}"))?;
    let curve = r1cs::read_header(&mut r)?.curve()?;
    Ok((r, curve))
}

fn same_curve(a: CurveId, b: CurveId, what: &str) -> Result<()> {
    if a != b {
        bail!("{what} is on {} but the other input is on {}", b.name(), a.name());
    }
    Ok(())
}

// ============================================================================
// ptau
// ============================================================================

fn ptau_cmd(sub: &str, args: &[String]) -> Result<bool> {
    let pos = positional(args);
    let name = parse_flag(args, "--name");
    let entropy = parse_flag(args, "--entropy").unwrap_or_default();
    match sub {
        "new" => {
            let curve = CurveId::from_name(arg(&pos, 0, "curve")?)?;
            let power = parse_u32(arg(&pos, 1, "power")?, "power")?;
            let out = PendingFile::create(arg(&pos, 2, "out.ptau")?)?;
            let (out, _) = with_curve!(curve, E => ptau::new::new_accumulator::<E, _>(out, power))?;
            out.persist()?;
        }
        "contribute" => {
            let (mut r, curve) = open_ptau(arg(&pos, 0, "in.ptau")?)?;
            let out = PendingFile::create(arg(&pos, 1, "out.ptau")?)?;
            let (out, receipt) = with_curve!(curve, E => {
                ptau::contribute::contribute::<E, _, _>(&mut r, out, entropy.as_bytes(), name.as_deref())
            })?;
            out.persist()?;
            println!("Contribution response hash:\n\t\t{}", format_hash(&receipt.response_hash));
        }
        "beacon" => {
            let (mut r, curve) = open_ptau(arg(&pos, 0, "in.ptau")?)?;
            let out = PendingFile::create(arg(&pos, 1, "out.ptau")?)?;
            let hash = hex::decode(arg(&pos, 2, "beaconHashHex")?).context("beacon hash must be hex")?;
            let exp = parse_u32(arg(&pos, 3, "numIterationsExp")?, "numIterationsExp")?;
            let (out, receipt) = with_curve!(curve, E => {
                ptau::contribute::beacon::<E, _, _>(&mut r, out, &hash, exp, name.as_deref())
            })?;
            out.persist()?;
            println!("Contribution response hash:\n\t\t{}", format_hash(&receipt.response_hash));
        }
        "verify" => {
            let (mut r, curve) = open_ptau(arg(&pos, 0, "in.ptau")?)?;
            return Ok(with_curve!(curve, E => ptau::verify::verify::<E, _>(&mut r))?);
        }
        "prepare" => {
            let (mut r, curve) = open_ptau(arg(&pos, 0, "in.ptau")?)?;
            let out = PendingFile::create(arg(&pos, 1, "out.ptau")?)?;
            let out = with_curve!(curve, E => ptau::phase2::prepare_phase2::<E, _, _>(&mut r, out))?;
            out.persist()?;
        }
        "truncate" => {
            let (mut r, curve) = open_ptau(arg(&pos, 0, "in.ptau")?)?;
            let power = parse_u32(arg(&pos, 1, "power")?, "power")?;
            let out = PendingFile::create(arg(&pos, 2, "out.ptau")?)?;
            let out = with_curve!(curve, E => ptau::truncate::truncate::<E, _, _>(&mut r, out, power))?;
            out.persist()?;
        }
        "export-challenge" => {
            let (mut r, curve) = open_ptau(arg(&pos, 0, "in.ptau")?)?;
            let out = PendingFile::create(arg(&pos, 1, "challenge")?)?;
            let (out, _) = with_curve!(curve, E => ptau::challenge::export_challenge::<E, _, _>(&mut r, out))?;
            out.persist()?;
        }
        "challenge-contribute" => {
            let curve = CurveId::from_name(arg(&pos, 0, "curve")?)?;
            let path = arg(&pos, 1, "challenge")?;
            let input = BufReader::new(File::open(path).with_context(|| format!("open {path}"))?);
            let out = PendingFile::create(arg(&pos, 2, "response")?)?;
            let (out, hash) = with_curve!(curve, E => {
                ptau::challenge::contribute_challenge::<E, _, _>(input, out, entropy.as_bytes())
            })?;
            out.persist()?;
            println!("Response hash:\n\t\t{}", format_hash(&hash));
        }
        "import-response" => {
            let (mut r, curve) = open_ptau(arg(&pos, 0, "in.ptau")?)?;
            let path = arg(&pos, 1, "response")?;
            let response = BufReader::new(File::open(path).with_context(|| format!("open {path}"))?);
            let out = PendingFile::create(arg(&pos, 2, "out.ptau")?)?;
            let (out, receipt) = with_curve!(curve, E => {
                ptau::challenge::import_response::<E, _, _, _>(&mut r, response, out, name.as_deref())
            })?;
            out.persist()?;
            println!("Next challenge hash:\n\t\t{}", format_hash(&receipt.next_challenge));
        }
        other => bail!("unknown ptau command {other:?}\n{USAGE}"),
    }
    Ok(true)
}

// ============================================================================
// Setup and zkey
// ============================================================================

fn setup_cmd(args: &[String]) -> Result<bool> {
    let pos = positional(args);
    let protocol = Protocol::from_name(arg(&pos, 0, "protocol")?)?;
    let (mut rr, curve) = open_r1cs(arg(&pos, 1, "circuit.r1cs")?)?;
    let (mut pr, ptau_curve) = open_ptau(arg(&pos, 2, "final.ptau")?)?;
    same_curve(curve, ptau_curve, "the ceremony")?;
    let out = PendingFile::create(arg(&pos, 3, "out.zkey")?)?;
    with_curve!(curve, E => {
        let circuit = R1cs::<E>::read(&mut rr)?;
        let out = match protocol {
            Protocol::Groth16 => {
                let (out, cs_hash) = groth16::setup::new_zkey(&circuit, &mut pr, out)?;
                println!("Circuit hash:\n\t\t{}", format_hash(&cs_hash));
                out
            }
            Protocol::Plonk => plonk::setup::new_zkey(&circuit, &mut pr, out)?,
            Protocol::Fflonk => fflonk::setup::new_zkey(&circuit, &mut pr, out)?,
        };
        out.persist()?;
    });
    Ok(true)
}

fn zkey_cmd(sub: &str, args: &[String]) -> Result<bool> {
    let pos = positional(args);
    let name = parse_flag(args, "--name");
    match sub {
        "contribute" | "beacon" => {
            let (mut r, protocol, curve) = open_zkey(arg(&pos, 0, "in.zkey")?)?;
            protocol.expect(Protocol::Groth16)?;
            let out = PendingFile::create(arg(&pos, 1, "out.zkey")?)?;
            let (out, hash) = if sub == "contribute" {
                let entropy = parse_flag(args, "--entropy").unwrap_or_default();
                with_curve!(curve, E => {
                    groth16::mpc::contribute::<E, _, _>(&mut r, out, entropy.as_bytes(), name.as_deref())
                })?
            } else {
                let hash = hex::decode(arg(&pos, 2, "beaconHashHex")?).context("beacon hash must be hex")?;
                let exp = parse_u32(arg(&pos, 3, "numIterationsExp")?, "numIterationsExp")?;
                with_curve!(curve, E => groth16::mpc::beacon::<E, _, _>(&mut r, out, &hash, exp, name.as_deref()))?
            };
            out.persist()?;
            println!("Contribution hash:\n\t\t{}", format_hash(&hash));
        }
        "verify" => {
            let (mut rr, curve) = open_r1cs(arg(&pos, 0, "circuit.r1cs")?)?;
            let (mut pr, ptau_curve) = open_ptau(arg(&pos, 1, "final.ptau")?)?;
            let (mut zr, protocol, zkey_curve) = open_zkey(arg(&pos, 2, "in.zkey")?)?;
            same_curve(curve, ptau_curve, "the ceremony")?;
            same_curve(curve, zkey_curve, "the zkey")?;
            protocol.expect(Protocol::Groth16)?;
            return with_curve!(curve, E => {
                let circuit = R1cs::<E>::read(&mut rr)?;
                Ok(groth16::mpc::verify_from_init(&circuit, &mut pr, &mut zr)?)
            });
        }
        "export-vkey" => {
            let (mut r, protocol, curve) = open_zkey(arg(&pos, 0, "in.zkey")?)?;
            let vk = with_curve!(curve, E => match protocol {
                Protocol::Groth16 => groth16::export_verification_key::<E, _>(&mut r)?.to_json(),
                Protocol::Plonk => plonk::export_verification_key::<E, _>(&mut r)?.to_json(),
                Protocol::Fflonk => fflonk::export_verification_key::<E, _>(&mut r)?.to_json(),
            });
            write_json(arg(&pos, 1, "vkey.json")?, &vk)?;
        }
        other => bail!("unknown zkey command {other:?}\n{USAGE}"),
    }
    Ok(true)
}

// ============================================================================
// Prove and verify
// ============================================================================

fn prove_cmd(args: &[String]) -> Result<bool> {
    let pos = positional(args);
    let (mut zr, protocol, curve) = open_zkey(arg(&pos, 0, "in.zkey")?)?;
    let wpath = arg(&pos, 1, "witness.wtns")?;
    let mut wr = open_file(wpath, WTNS_MAGIC, WTNS_VERSION).with_context(|| format!("open {wpath}"))?;
    same_curve(curve, wtns::read_curve(&mut wr)?, "the witness")?;
    let (proof, public) = with_curve!(curve, E => {
        let witness = wtns::read::<E, _>(&mut wr)?;
        let (proof, public) = match protocol {
            Protocol::Groth16 => {
                let (p, s) = groth16::prover::prove::<E, _>(&mut zr, &witness)?;
                (p.to_json(), s)
            }
            Protocol::Plonk => {
                let (p, s) = plonk::prover::prove::<E, _>(&mut zr, &witness)?;
                (p.to_json(), s)
            }
            Protocol::Fflonk => {
                let (p, s) = fflonk::prover::prove::<E, _>(&mut zr, &witness)?;
                (p.to_json(), s)
            }
        };
        (proof, zkey::public_signals_to_json::<E>(&public))
    });
    write_json(arg(&pos, 2, "proof.json")?, &proof)?;
    write_json(arg(&pos, 3, "public.json")?, &public)?;
    info!(protocol = protocol.name(), curve = curve.name(), "proof written");
    Ok(true)
}

fn verify_cmd(args: &[String]) -> Result<bool> {
    let pos = positional(args);
    let vk = read_json(arg(&pos, 0, "vkey.json")?)?;
    let public = read_json(arg(&pos, 1, "public.json")?)?;
    let proof = read_json(arg(&pos, 2, "proof.json")?)?;
    let (protocol, curve) = zkey::json_protocol_and_curve(&vk)?;
    let (proof_protocol, proof_curve) = zkey::json_protocol_and_curve(&proof)?;
    proof_protocol.expect(protocol)?;
    same_curve(curve, proof_curve, "the proof")?;
    with_curve!(curve, E => verify_json::<E>(protocol, &vk, &public, &proof))
}

fn verify_json<E: PairingCurve>(protocol: Protocol, vk: &Value, public: &Value, proof: &Value) -> Result<bool> {
    let public = zkey::public_signals_from_json::<E>(public)?;
    let ok = match protocol {
        Protocol::Groth16 => groth16::verifier::verify(
            &groth16::VerificationKey::<E>::from_json(vk)?,
            &public,
            &groth16::Proof::<E>::from_json(proof)?,
        )?,
        Protocol::Plonk => plonk::verifier::verify(
            &plonk::VerificationKey::<E>::from_json(vk)?,
            &public,
            &plonk::Proof::<E>::from_json(proof)?,
        )?,
        Protocol::Fflonk => fflonk::verifier::verify(
            &fflonk::VerificationKey::<E>::from_json(vk)?,
            &public,
            &fflonk::Proof::<E>::from_json(proof)?,
        )?,
    };
    Ok(ok)
}

// ============================================================================
// Entry
// ============================================================================

fn run(args: &[String]) -> Result<bool> {
    let cmd = args.first().map(String::as_str).unwrap_or("help");
    let sub = args.get(1).map(String::as_str).unwrap_or("");
    match cmd {
        "ptau" | "powersoftau" => ptau_cmd(sub, &args[2.min(args.len())..]),
        "setup" => setup_cmd(&args[1..]),
        "zkey" => zkey_cmd(sub, &args[2.min(args.len())..]),
        "prove" => prove_cmd(&args[1..]),
        "verify" => verify_cmd(&args[1..]),
        "help" | "--help" | "-h" => {
            println!("{HELP}");
            Ok(true)
        }
        other => bail!("unknown command {other:?}\n{USAGE}"),
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(std::env::var("RUST_LOG").unwrap_or_else(|_| "zkforge=info".into()))
        .with_target(false)
        .compact()
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if !run(&args)? {
        error!("verification failed");
        std::process::exit(1);
    }
    Ok(())
}
