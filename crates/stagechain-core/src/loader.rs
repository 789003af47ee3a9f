//! Loader templates: the runtime code of each forwarding stage and of the
//! entry point.
//!
//! Every local name comes from the caller's [`NameSupply`], so the loaders
//! share no fixed identifiers across runs. The only fixed text is the runtime
//! API surface (`game:HttpGet`, `loadstring`, `debug.getinfo`).

use std::fmt;

use crate::integrity::{checksum, minify};
use crate::mutator::{self, Snippet};
use crate::random::NameSupply;
use crate::types::{AccessHeader, StageInput};

/// Rendered loader text plus every name it binds.
#[derive(Debug, Clone)]
pub struct Rendered {
    /// Minified loader source.
    pub text: String,
    /// Identifiers bound anywhere in the loader.
    pub bindings: Vec<String>,
}

/// The statement handed back to the caller that starts the chain.
///
/// Its text is `FETCH(CHECKSUM)`, where `FETCH` fetches and loads the
/// verification stage and `CHECKSUM` is the additive checksum of `FETCH`'s
/// exact bytes. Because `FETCH` is a literal prefix of the entry point, the
/// bytes checksummed at generation are the bytes the client transmits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryPoint {
    fetch: String,
    checksum: u8,
}

impl EntryPoint {
    /// Build the entry point for a verification stage at `url`.
    pub fn new(url: &str, header: &AccessHeader) -> Self {
        let fetch = format!("loadstring({})", http_get(url, header));
        let checksum = checksum(fetch.as_bytes());
        Self { fetch, checksum }
    }

    /// The fetch-and-load expression, without the argument list.
    pub fn fetch_expression(&self) -> &str {
        &self.fetch
    }

    /// Checksum the verification stage expects.
    pub fn checksum(&self) -> u8 {
        self.checksum
    }

    /// The input the entry point passes to the verification stage.
    pub fn input(&self) -> StageInput {
        StageInput::Verification {
            checksum: self.checksum,
        }
    }

    /// The complete entry-point statement.
    pub fn text(&self) -> String {
        format!("{}{}", self.fetch, self.input().call_args())
    }
}

impl fmt::Display for EntryPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text())
    }
}

/// A guarded fetch of `url` presenting `header`.
pub fn http_get(url: &str, header: &AccessHeader) -> String {
    format!(
        "game:HttpGet(\"{}\", true, {{[\"{}\"] = \"{}\"}})",
        url, header.name, header.value
    )
}

/// Where a forwarding stage fetches its successor from.
#[derive(Debug, Clone, Copy)]
pub struct NextStage<'a> {
    /// Absolute or relative URL of the successor.
    pub url: &'a str,
    /// Header the successor requires.
    pub header: &'a AccessHeader,
    /// Checksum of the successor's stored content.
    pub checksum: u8,
}

/// Verification-and-forward stage.
///
/// Receives the entry-point checksum, aborts silently on mismatch, then
/// fetches the decrypt stage, checks its content, and invokes it with
/// `forward` (the first key part).
pub fn verification_stage<N: NameSupply + ?Sized>(
    names: &mut N,
    expected_entry: u8,
    next: NextStage<'_>,
    forward: &StageInput,
) -> Rendered {
    let presented = names.fresh(12);
    let fetched = names.fresh(11);
    let chk = mutator::checksum_fn(names);

    let source = format!(
        "
        local {presented} = ... -- checksum from the entry point
        if {presented} ~= {expected_entry} then return end
        {chk_decl}
        local {fetched} = {get}
        if {chk}({fetched}) ~= {next_sum} then return end
        loadstring({fetched}){args}
        ",
        chk_decl = chk.text,
        chk = chk.entry,
        get = http_get(next.url, next.header),
        next_sum = next.checksum,
        args = forward.call_args(),
    );

    let mut bindings = vec![presented, fetched];
    bindings.extend(chk.bindings);
    Rendered {
        text: minify(&source),
        bindings,
    }
}

/// Decrypt-and-execute stage.
///
/// Receives the first key part, fetches the payload, checks it, rebuilds the
/// key with the embedded second part, decodes and runs the script.
pub fn decrypt_stage<N: NameSupply + ?Sized>(
    names: &mut N,
    payload: NextStage<'_>,
    key_part2: &str,
) -> Rendered {
    let part1 = names.fresh(9);
    let fetched = names.fresh(7);
    let part2 = names.fresh(9);
    let raw = names.fresh(11);
    let key = names.fresh(9);
    let script = names.fresh(6);
    let func = names.fresh(2);
    let err = names.fresh(3);
    let b64: Snippet = mutator::base64_decoder(names);
    let xor: Snippet = mutator::xor_decoder(names);
    let chk: Snippet = mutator::checksum_fn(names);

    let source = format!(
        "
        -- native loadstring only
        if debug.getinfo(loadstring,'S').what ~= 'C' then return end
        local {part1} = ... -- first key part from the previous stage
        local {fetched} = {get}
        local {part2} = \"{key_part2}\"
        {b64_decl}
        {xor_decl}
        {chk_decl}
        if {chk}({fetched}) ~= {payload_sum} then return end
        local {raw} = {b64}({fetched})
        local {key} = {part1} .. {part2}
        local {script} = {xor}({raw}, {key})
        local {func}, {err} = loadstring({script})
        if {func} then {func}() else error({err}) end
        ",
        get = http_get(payload.url, payload.header),
        payload_sum = payload.checksum,
        b64_decl = b64.text,
        xor_decl = xor.text,
        chk_decl = chk.text,
        b64 = b64.entry,
        xor = xor.entry,
        chk = chk.entry,
    );

    let mut bindings = vec![part1, fetched, part2, raw, key, script, func, err];
    bindings.extend(b64.bindings);
    bindings.extend(xor.bindings);
    bindings.extend(chk.bindings);
    Rendered {
        text: minify(&source),
        bindings,
    }
}
