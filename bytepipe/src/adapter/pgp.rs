use crate::config::StageConf;
use crate::relay::{relay, RelayReader, RelayWriter, DEFAULT_RELAY_CAPACITY};
use crate::stage::{Filter, Source};
use crate::{PipeError, PipeErrorKind, PipeResult};
use anyhow::anyhow;
use crossbeam_channel::{bounded, Receiver, Sender};
use log::error;
use openpgp::cert::{Cert, CertParser};
use openpgp::crypto::SessionKey;
use openpgp::packet::{PKESK, SKESK};
use openpgp::parse::stream::{
    DecryptionHelper, DecryptorBuilder, MessageStructure, VerificationHelper,
};
use openpgp::parse::Parse;
use openpgp::policy::StandardPolicy;
use openpgp::serialize::stream::{Encryptor2, LiteralWriter, Message};
use openpgp::types::SymmetricAlgorithm;
use sequoia_openpgp as openpgp;
use std::io::{self, Cursor, Read};
use std::sync::Mutex;
use std::thread;

const POLICY: &StandardPolicy = &StandardPolicy::new();

/// Create an encryption filter for the armored public keyring in the `pubkey` config key. The
/// output is a binary OpenPGP message readable by any conformant implementation holding a
/// matching secret key.
pub fn new_encrypt(conf: &StageConf) -> PipeResult<Box<dyn Filter>> {
    let certs = parse_keyring(conf, "pubkey")?;
    // fail at construction when the keyring can't encrypt at all
    let usable = certs.iter().any(|cert| {
        encryption_keys(cert).next().is_some()
    });
    if !usable {
        return Err(PipeError::new_msg(
            PipeErrorKind::Parameter("pubkey".to_string()),
            "keyring contains no encryption capable key".to_string(),
        ));
    }

    let (writer, reader) = relay(DEFAULT_RELAY_CAPACITY);
    let (gate_tx, gate_rx) = bounded(1);
    thread::spawn(move || encrypt_worker(certs, gate_rx, writer));
    Ok(Box::new(PgpFilter {
        reader,
        gate: Some(gate_tx),
    }))
}

/// Create a decryption filter for the armored secret keyring in the `privatkey` config key. A
/// message the keyring cannot decrypt fails with a distinct "cannot decrypt" stream error, never
/// with truncated or garbage plaintext.
pub fn new_decrypt(conf: &StageConf) -> PipeResult<Box<dyn Filter>> {
    let certs = parse_keyring(conf, "privatkey")?;

    let (writer, reader) = relay(DEFAULT_RELAY_CAPACITY);
    let (gate_tx, gate_rx) = bounded(1);
    thread::spawn(move || decrypt_worker(certs, gate_rx, writer));
    Ok(Box::new(PgpFilter {
        reader,
        gate: Some(gate_tx),
    }))
}

fn parse_keyring(conf: &StageConf, key: &str) -> PipeResult<Vec<Cert>> {
    let armored = conf.get(key).map(String::as_str).unwrap_or("");
    if armored.is_empty() {
        return Err(PipeError::parameter(key));
    }
    let certs: Vec<Cert> = CertParser::from_reader(Cursor::new(armored.as_bytes().to_vec()))
        .and_then(|parser| parser.collect::<openpgp::Result<Vec<Cert>>>())
        .map_err(|e| {
            PipeError::new_msg(
                PipeErrorKind::Parameter(key.to_string()),
                format!("couldn't read keyring: {}", e),
            )
        })?;
    if certs.is_empty() {
        return Err(PipeError::new_msg(
            PipeErrorKind::Parameter(key.to_string()),
            "keyring is empty".to_string(),
        ));
    }
    Ok(certs)
}

fn encryption_keys(
    cert: &Cert,
) -> impl Iterator<Item = openpgp::cert::amalgamation::key::ValidErasedKeyAmalgamation<'_, openpgp::packet::key::PublicParts>>
{
    cert.keys()
        .with_policy(POLICY, None)
        .supported()
        .alive()
        .revoked(false)
        .for_transport_encryption()
        .for_storage_encryption()
}

/// Both pgp filters share this shape: the OpenPGP engine lives on a worker thread feeding a
/// relay, and `link` hands the upstream to the worker through a one-shot channel. For encryption
/// this is the readiness gate: the worker only picks up the upstream once the encryptor stack is
/// fully initialized, so no plaintext can reach a half built engine. For decryption it keeps the
/// envelope parsing off the caller.
struct PgpFilter {
    reader: RelayReader,
    gate: Option<Sender<Source>>,
}

impl Read for PgpFilter {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        // an unlinked filter must error instead of blocking on a worker that waits forever
        if self.gate.is_some() {
            return Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "pgp filter is not linked",
            ));
        }
        self.reader.read(buf)
    }
}

impl Filter for PgpFilter {
    fn link(&mut self, upstream: Source) -> PipeResult<()> {
        let gate = self.gate.take().ok_or_else(|| {
            PipeError::new_msg(
                PipeErrorKind::Link("pgp".to_string()),
                "filter is already linked".to_string(),
            )
        })?;
        // the channel holds one slot, this never blocks
        gate.send(upstream).map_err(|_| {
            PipeError::new_msg(
                PipeErrorKind::Link("pgp".to_string()),
                "worker is gone".to_string(),
            )
        })
    }
}

fn encrypt_worker(certs: Vec<Cert>, gate: Receiver<Source>, mut writer: RelayWriter) {
    match run_encryption(&certs, gate, &mut writer) {
        Ok(()) => writer.finish(),
        Err(e) => {
            error!("pgp encryption failed: {}", e);
            writer.fail(io::Error::new(io::ErrorKind::Other, e.to_string()));
        }
    }
}

fn run_encryption(
    certs: &[Cert],
    gate: Receiver<Source>,
    writer: &mut RelayWriter,
) -> openpgp::Result<()> {
    let mut recipients = Vec::new();
    for cert in certs {
        recipients.extend(encryption_keys(cert));
    }

    let message = Message::new(writer);
    let message = Encryptor2::for_recipients(message, recipients).build()?;
    let mut message = LiteralWriter::new(message).build()?;

    // the encryptor is initialized only at this point; the upstream was deliberately not
    // touched before
    let mut upstream = match gate.recv() {
        Ok(upstream) => upstream,
        // never linked, nothing to encrypt
        Err(_) => return Ok(()),
    };
    io::copy(&mut upstream, &mut message)?;
    message.finalize()?;
    Ok(())
}

fn decrypt_worker(certs: Vec<Cert>, gate: Receiver<Source>, mut writer: RelayWriter) {
    let upstream = match gate.recv() {
        Ok(upstream) => upstream,
        Err(_) => {
            writer.finish();
            return;
        }
    };
    let helper = KeyHelper { certs };
    let mut decryptor = match DecryptorBuilder::from_reader(SyncReader(Mutex::new(upstream)))
        .and_then(|builder| builder.with_policy(POLICY, None, helper))
    {
        Ok(decryptor) => decryptor,
        Err(e) => {
            error!("pgp decryption failed: {}", e);
            writer.fail(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("cannot decrypt message: {}", e),
            ));
            return;
        }
    };
    match io::copy(&mut decryptor, &mut writer) {
        Ok(_) => writer.finish(),
        Err(e) => {
            error!("pgp decryption failed mid stream: {}", e);
            writer.fail(e);
        }
    }
}

// sequoia's parser wants Sync readers; the mutex is never contended as the worker is the only
// reader
struct SyncReader(Mutex<Source>);

impl Read for SyncReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.0.get_mut() {
            Ok(upstream) => upstream.read(buf),
            Err(_) => Err(io::Error::new(io::ErrorKind::Other, "poisoned upstream")),
        }
    }
}

struct KeyHelper {
    certs: Vec<Cert>,
}

impl VerificationHelper for KeyHelper {
    fn get_certs(&mut self, _ids: &[openpgp::KeyHandle]) -> openpgp::Result<Vec<Cert>> {
        Ok(Vec::new())
    }

    // signatures are not verified, the body is wanted either way
    fn check(&mut self, _structure: MessageStructure) -> openpgp::Result<()> {
        Ok(())
    }
}

impl DecryptionHelper for KeyHelper {
    fn decrypt<D>(
        &mut self,
        pkesks: &[PKESK],
        _skesks: &[SKESK],
        sym_algo: Option<SymmetricAlgorithm>,
        mut decrypt: D,
    ) -> openpgp::Result<Option<openpgp::Fingerprint>>
    where
        D: FnMut(SymmetricAlgorithm, &SessionKey) -> bool,
    {
        for cert in &self.certs {
            for ka in cert.keys().secret() {
                let mut pair = match ka.key().clone().into_keypair() {
                    Ok(pair) => pair,
                    // encrypted secret key material, can't use it without a passphrase
                    Err(_) => continue,
                };
                for pkesk in pkesks {
                    if let Some((algo, session_key)) = pkesk.decrypt(&mut pair, sym_algo) {
                        if decrypt(algo, &session_key) {
                            return Ok(None);
                        }
                    }
                }
            }
        }
        Err(anyhow!("no key in the keyring can decrypt the message"))
    }
}
