use anyhow::{Context, Result, anyhow, bail};
use clap::{Parser, Subcommand};
use serde_json::Value;
use std::fs;
use std::path::PathBuf;

use invoke_codegen::lir::Listing;
use invoke_codegen::{
    CallInfo, CodeEmitter, CompilerOptions, DexFileId, DirectTarget, EmittedCode, FrameLayout,
    InstructionSet, Intrinsic, InvokeOutcome, InvokeType, MethodContext, MethodLoweringInfo,
    MethodRef, OptFlags, PromotionMap, Reg, VReg, ValueLocation, gen_invoke,
};

#[derive(Parser)]
#[command(name = "invoke-codegen")]
#[command(about = "Lower invoke call sites to LIR listings")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Lower every call site of a method description and print the listing.
    Lower {
        #[arg(help = "Method description (JSON)")]
        input: PathBuf,

        #[arg(long, default_value = "thumb2", help = "Target: thumb2, x86 or mips")]
        isa: String,

        #[arg(long, help = "Rely on the fault handler instead of explicit null checks")]
        implicit_null_checks: bool,

        #[arg(long, help = "Never expand intrinsics inline")]
        no_intrinsics: bool,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Lower {
            input,
            isa,
            implicit_null_checks,
            no_intrinsics,
        } => {
            let instruction_set = InstructionSet::from_name(&isa)
                .ok_or_else(|| anyhow!("unknown instruction set '{isa}'"))?;
            let contents = fs::read_to_string(&input)
                .with_context(|| format!("Failed to read {}", input.display()))?;
            let json: Value = serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse {}", input.display()))?;

            let ctx = parse_method(&json)?;
            let calls = json
                .get("calls")
                .and_then(Value::as_array)
                .ok_or_else(|| anyhow!("'calls' must be an array of call sites"))?;

            let options = CompilerOptions {
                instruction_set,
                implicit_null_checks,
                inline_intrinsics: !no_intrinsics,
            };
            tracing::debug!(?instruction_set, calls = calls.len(), "lowering method");
            let mut e = CodeEmitter::new(options, ctx);
            for (n, call) in calls.iter().enumerate() {
                let info = parse_call(call).with_context(|| format!("call site {n}"))?;
                let outcome =
                    gen_invoke(&mut e, &info).with_context(|| format!("Lowering call site {n}"))?;
                print_outcome(n, &info, &outcome);
            }
            let code = e.finish().context("Finishing method")?;
            print_listing(instruction_set, &code);
        }
    }

    Ok(())
}

fn print_outcome(n: usize, info: &CallInfo, outcome: &InvokeOutcome) {
    let method = info.method.target;
    match outcome {
        InvokeOutcome::Inlined(intrinsic) => {
            println!("; call {n}: {method} inlined as {intrinsic:?}");
        }
        InvokeOutcome::Call(summary) => {
            println!(
                "; call {n}: {method} {:?} via {:?}, {} dispatch steps, call at {}",
                info.method.invoke_type,
                summary.strategy,
                summary.dispatch_steps,
                summary.call_index
            );
        }
    }
}

fn print_listing(isa: InstructionSet, code: &EmittedCode) {
    let abi = isa.abi();
    for (i, insn) in code.instructions.iter().enumerate() {
        if i == code.main_len {
            println!("; deferred");
        }
        let marker = if code.safepoints.contains(&i) { '*' } else { ' ' };
        println!(
            "{i:5}{marker} {}",
            Listing {
                insn,
                abi: Some(abi)
            }
        );
    }
    for fixup in &code.linker_fixups {
        println!(
            "; fixup @{}: {:?} {}",
            fixup.instruction, fixup.kind, fixup.method
        );
    }
}

// ── JSON Parsing ──
//
// {
//   "dex_file": 0, "num_method_ids": 1024,
//   "frame": { "outs": 8, "vregs": 32 },
//   "promote": [ { "vreg": 3, "core": 5 }, { "vreg": 6, "fp": 2 } ],
//   "calls": [ {
//     "invoke": "virtual", "sharp": "direct", "method": 7, "fast": true,
//     "vtable_index": 3, "direct_code": "patch", "direct_method": 4096,
//     "range": false, "non_null": false, "in_range": false, "dex_pc": 16,
//     "intrinsic": "String.charAt",
//     "args": [ { "vreg": 0 }, { "vreg": 1, "wide": true }, { "const": 5 } ],
//     "result": { "vreg": 10 }
//   } ]
// }

fn parse_method(json: &Value) -> Result<MethodContext> {
    let frame = match json.get("frame") {
        Some(frame) => FrameLayout {
            num_outs: u32_field(frame, "outs")?.unwrap_or(8),
            num_vregs: u32_field(frame, "vregs")?.unwrap_or(32),
        },
        None => FrameLayout {
            num_outs: 8,
            num_vregs: 32,
        },
    };

    let mut promotion = PromotionMap::new();
    if let Some(entries) = json.get("promote").and_then(Value::as_array) {
        for entry in entries {
            let vreg = VReg(u32_field(entry, "vreg")?.context("promotion needs 'vreg'")?);
            if let Some(n) = u32_field(entry, "core")? {
                promotion.promote_core(vreg, Reg::Core(reg_number(n)?));
            } else if let Some(n) = u32_field(entry, "fp")? {
                promotion.promote_fp(vreg, Reg::Fp(reg_number(n)?));
            } else {
                bail!("promotion of v{} names no register", vreg.0);
            }
        }
    }

    Ok(MethodContext {
        dex_file: DexFileId(u32_field(json, "dex_file")?.unwrap_or(0)),
        num_method_ids: u32_field(json, "num_method_ids")?.unwrap_or(0x1_0000),
        frame,
        promotion,
    })
}

fn parse_call(call: &Value) -> Result<CallInfo> {
    let invoke_type = parse_invoke_type(
        call.get("invoke")
            .and_then(Value::as_str)
            .context("call site needs 'invoke'")?,
    )?;
    let sharp_type = match call.get("sharp").and_then(Value::as_str) {
        Some(name) => parse_invoke_type(name)?,
        None => invoke_type,
    };
    let dex_file = DexFileId(u32_field(call, "dex_file")?.unwrap_or(0));
    let method_index = u32_field(call, "method")?.context("call site needs 'method'")?;

    let mut args = Vec::new();
    if let Some(list) = call.get("args").and_then(Value::as_array) {
        for (i, arg) in list.iter().enumerate() {
            args.extend(parse_location(arg, args.len()).with_context(|| format!("argument {i}"))?);
        }
    }
    let result = match call.get("result") {
        Some(loc) => parse_location(loc, 0)?.into_iter().next(),
        None => None,
    };
    let intrinsic = match call.get("intrinsic").and_then(Value::as_str) {
        Some(name) => {
            Some(Intrinsic::from_name(name).ok_or_else(|| anyhow!("unknown intrinsic '{name}'"))?)
        }
        None => None,
    };

    Ok(CallInfo {
        dex_pc: u32_field(call, "dex_pc")?.unwrap_or(0),
        args,
        result,
        is_range: bool_field(call, "range"),
        opt_flags: OptFlags {
            ignore_null_check: bool_field(call, "non_null"),
            ignore_range_check: bool_field(call, "in_range"),
        },
        method: MethodLoweringInfo {
            invoke_type,
            sharp_type,
            fast_path: call.get("fast").and_then(Value::as_bool).unwrap_or(true),
            target: MethodRef {
                dex_file,
                method_index,
            },
            vtable_index: u32_field(call, "vtable_index")?.unwrap_or(0),
            direct_code: parse_direct(call.get("direct_code"))?,
            direct_method: parse_direct(call.get("direct_method"))?,
        },
        intrinsic,
    })
}

fn parse_invoke_type(name: &str) -> Result<InvokeType> {
    Ok(match name {
        "static" => InvokeType::Static,
        "direct" => InvokeType::Direct,
        "virtual" => InvokeType::Virtual,
        "super" => InvokeType::Super,
        "interface" => InvokeType::Interface,
        _ => bail!("unknown invoke type '{name}'"),
    })
}

fn parse_direct(value: Option<&Value>) -> Result<DirectTarget> {
    match value {
        None => Ok(DirectTarget::Unknown),
        Some(Value::String(s)) if s == "unknown" => Ok(DirectTarget::Unknown),
        Some(Value::String(s)) if s == "patch" => Ok(DirectTarget::LinkerPatch),
        Some(v) => v
            .as_u64()
            .and_then(|addr| u32::try_from(addr).ok())
            .map(DirectTarget::Known)
            .ok_or_else(|| anyhow!("direct target must be \"unknown\", \"patch\" or an address")),
    }
}

/// One argument or result: a frame value at `vreg`, or a constant. Constants
/// without a `vreg` take the argument word index as their register number.
fn parse_location(value: &Value, word: usize) -> Result<Vec<ValueLocation>> {
    let vreg = VReg(match u32_field(value, "vreg")? {
        Some(v) => v,
        None => u32::try_from(word)?,
    });
    let wide = bool_field(value, "wide");
    let fp = bool_field(value, "fp");

    let mut words = match value.get("const") {
        Some(c) => {
            let c = c.as_i64().context("'const' must be an integer")?;
            if wide {
                ValueLocation::constant_wide(vreg, c).to_vec()
            } else {
                let narrow = i32::try_from(c)
                    .or_else(|_| u32::try_from(c).map(|u| u as i32))
                    .context("narrow constant out of range")?;
                vec![ValueLocation::constant(vreg, narrow)]
            }
        }
        None if wide => ValueLocation::frame_wide(vreg).to_vec(),
        None => vec![ValueLocation::frame(vreg)],
    };
    if fp {
        for w in &mut words {
            *w = w.with_fp();
        }
    }
    Ok(words)
}

fn u32_field(value: &Value, key: &str) -> Result<Option<u32>> {
    match value.get(key) {
        None => Ok(None),
        Some(v) => {
            let n = v
                .as_u64()
                .and_then(|n| u32::try_from(n).ok())
                .ok_or_else(|| anyhow!("'{key}' must be a 32-bit unsigned integer"))?;
            Ok(Some(n))
        }
    }
}

fn bool_field(value: &Value, key: &str) -> bool {
    value.get(key).and_then(Value::as_bool).unwrap_or(false)
}

fn reg_number(n: u32) -> Result<u8> {
    u8::try_from(n).with_context(|| format!("register number {n} out of range"))
}
