//! The font production pipeline: the concrete rule set.
//!
//! Stages, in dependency order: decompile the CJK source fonts, normalize
//! punctuation widths and Asian symbols, merge with the Latin sources
//! (pass 1), hint the kanji subfonts through the group/shard/cache chain,
//! produce the final per-style fonts (pass 2), collect them into TTC files,
//! and pack release archives. All font manipulation happens in external
//! tools (otfcc, ttx, ttfautohint, ideohint, otf2otc, 7z, node helper
//! scripts); this module only wires targets, dependencies, and argv.
//!
//! Paths are relative to the project root; the caller sets the working
//! directory before building.

pub mod config;

use std::path::Path;

use crate::action::ToolOptions;
use crate::engine::BuildContext;
use crate::error::{ActionError, ForgeError, ForgeResult};
use crate::rule::{Registry, RuleKind};
use crate::target::{Artifact, TargetResult};

use config::{BuildConfig, HintConfig, HintSettings};

/// Archive name prefix used when none is configured.
pub const DEFAULT_PREFIX: &str = "sarasa";

/// Builds the pipeline's rule registry.
pub struct Pipeline {
    prefix: String,
}

impl Pipeline {
    /// Creates a pipeline with the given output name prefix.
    #[must_use]
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Registers every pipeline rule into a fresh registry.
    ///
    /// # Errors
    /// Only for rule-table mistakes (duplicate or invalid patterns), which
    /// would make the binary unusable; the caller treats this as fatal.
    pub fn build_registry(&self) -> ForgeResult<Registry> {
        let mut registry = Registry::new();

        self.register_oracles(&mut registry)?;
        self.register_sources(&mut registry)?;
        self.register_passes(&mut registry)?;
        self.register_hinting(&mut registry)?;
        self.register_collections(&mut registry)?;
        self.register_archives(&mut registry)?;

        Ok(registry)
    }

    fn register_oracles(&self, registry: &mut Registry) -> ForgeResult<()> {
        registry.register(RuleKind::Oracle, "config", 1, |_, _| {
            Ok(TargetResult::Value(read_json("config.json")?))
        })?;

        registry.register(RuleKind::Oracle, "version", 1, |ctx, _| {
            let config: BuildConfig = ctx.need_value("config")?;
            Ok(TargetResult::Value(serde_json::Value::String(
                config.version,
            )))
        })?;

        registry.register(RuleKind::Oracle, "hinting-config", 1, |_, _| {
            Ok(TargetResult::Value(read_json("hinting-config.json")?))
        })?;

        registry.register(RuleKind::Oracle, "hinting-jobs", 1, |_, _| {
            let cpus = std::thread::available_parallelism()
                .map(std::num::NonZeroUsize::get)
                .unwrap_or(1);
            Ok(TargetResult::Value(serde_json::json!(cpus * 2)))
        })?;

        registry.register(RuleKind::Oracle, "scripts-dir-structure", 1, |_, _| {
            let mut scripts = Vec::new();
            collect_scripts(Path::new("make"), &mut scripts)?;
            scripts.sort();
            Ok(TargetResult::Value(serde_json::json!(scripts)))
        })?;

        // Helper-script edits invalidate everything that runs a script.
        registry.register(RuleKind::TaskGroup, "scripts", 1, |ctx, _| {
            let scripts: Vec<String> = ctx.need_value("scripts-dir-structure")?;
            for script in &scripts {
                ctx.source(script)?;
            }
            Ok(TargetResult::Done)
        })?;

        registry.register(RuleKind::Computed, "hinting-settings", 1, |ctx, _| {
            let raw = ctx.need_one("hinting-config")?;
            let settings = raw
                .as_value()
                .and_then(|v| v.get("settings"))
                .cloned()
                .ok_or_else(|| {
                    ForgeError::value("hinting-config.json has no 'settings' object")
                })?;
            Ok(TargetResult::Value(settings))
        })?;

        registry.register(RuleKind::Computed, "hinting-groups", 1, |ctx, _| {
            let hint: HintConfig = ctx.need_value("hinting-config")?;
            Ok(TargetResult::Value(serde_json::json!(hint.groups())))
        })?;

        registry.register(RuleKind::Phony, "print-hint-config", 1, |ctx, _| {
            let settings: HintSettings = ctx.need_value("hinting-settings")?;
            let groups: Vec<String> = ctx.need_value("hinting-groups")?;
            println!("{settings:?} {groups:?}");
            Ok(TargetResult::Done)
        })?;

        Ok(())
    }

    fn register_sources(&self, registry: &mut Registry) -> ForgeResult<()> {
        registry.register(RuleKind::FileRule, "build/shs/*-*.otd", 1, |ctx, info| {
            let config: BuildConfig = ctx.need_value("config")?;
            let (region, style) = (info.capture(0), info.capture(1));
            let stem = config.shs_source_name(region, style)?;
            let source = ctx.source(format!("sources/shs/{stem}.otf"))?;
            ctx.run(
                "otfccdump",
                vec![
                    "-o".to_string(),
                    info.id().to_string(),
                    path_str(&source.full),
                ],
            )?;
            Ok(TargetResult::Done)
        })?;

        register_punct(registry, "ws0", "make/punct/ws.js")?;
        register_punct(registry, "as0", "make/punct/as.js")?;

        registry.register(RuleKind::FileRule, "build/kanji0/*.ttf", 1, |ctx, info| {
            ctx.need_one("config")?;
            ctx.need_one("scripts")?;
            let name = info.capture(0);
            let shs = ctx.need_file(&format!("build/shs/{name}.otd"))?;
            let tmp_otd = format!("{}/{}.otd", info.dir(), name);
            run_script(
                ctx,
                "make/kanji/build.js",
                &ToolOptions::new()
                    .value("main", path_str(&shs.full))
                    .value("o", &tmp_otd),
            )?;
            ctx.run(
                "otfccbuild",
                vec![
                    tmp_otd.clone(),
                    "-o".to_string(),
                    info.id().to_string(),
                    "-q".to_string(),
                ],
            )?;
            ctx.remove(&tmp_otd)?;
            Ok(TargetResult::Done)
        })?;

        Ok(())
    }

    fn register_passes(&self, registry: &mut Registry) -> ForgeResult<()> {
        registry.register(RuleKind::FileRule, "build/pass1/*-*-*.ttf", 1, |ctx, info| {
            let config: BuildConfig = ctx.need_value("config")?;
            ctx.need_one("scripts")?;
            let (family, region, style) = (info.capture(0), info.capture(1), info.capture(2));
            let latin = config.family(family)?.latin_group.clone();
            let latin_src = ctx.source(format!("sources/{latin}/{latin}-{style}.ttf"))?;

            // Italic styles reuse the upright width/AS intermediates and get
            // slanted during the merge instead.
            let upright = config.upright_style_of(style);
            let as0_target = format!("build/as0/{family}-{region}-{upright}.ttf");
            let ws0_target = format!("build/ws0/{family}-{region}-{upright}.ttf");
            let normalized = need_files(ctx, &[&as0_target, &ws0_target])?;

            let raw = format!("{}.tmp.ttf", info.id());
            run_script(
                ctx,
                "make/pass1/build.js",
                &ToolOptions::new()
                    .value("main", path_str(&latin_src.full))
                    .value("asian", path_str(&normalized[0].full))
                    .value("ws", path_str(&normalized[1].full))
                    .value("o", &raw)
                    .value("family", family)
                    .value("subfamily", &config.subfamily(region)?.name)
                    .value("style", style)
                    .flag("italize", upright != style),
            )?;
            sanitize(ctx, info.id(), &raw)?;
            Ok(TargetResult::Done)
        })?;

        registry.register(
            RuleKind::FileRule,
            &format!("out/ttf/{}-*-*-*.ttf", self.prefix),
            1,
            |ctx, info| {
                let config: BuildConfig = ctx.need_value("config")?;
                ctx.need_one("scripts")?;
                ctx.need_one("version")?;
                ctx.need_one("hinting-config")?;
                let (family, region, style) = (info.capture(0), info.capture(1), info.capture(2));
                let upright = config.upright_style_of(style);

                let pass1_target = format!("build/pass1/{family}-{region}-{style}.ttf");
                let kanji_target = format!("build/kanji1/{region}-{upright}.ttf");
                let merged = need_files(ctx, &[&pass1_target, &kanji_target])?;

                let tmp_otd = format!("{}/{}.otd", info.dir(), info.name());
                run_script(
                    ctx,
                    "make/pass2/build.js",
                    &ToolOptions::new()
                        .value("main", path_str(&merged[0].full))
                        .value("kanji", path_str(&merged[1].full))
                        .value("o", &tmp_otd)
                        .flag("italize", upright != style),
                )?;
                ctx.run(
                    "otfccbuild",
                    vec![
                        tmp_otd.clone(),
                        "-o".to_string(),
                        info.id().to_string(),
                        "--keep-average-char-width".to_string(),
                        "-O3".to_string(),
                    ],
                )?;
                ctx.remove(&tmp_otd)?;
                Ok(TargetResult::Done)
            },
        )?;

        Ok(())
    }

    fn register_hinting(&self, registry: &mut Registry) -> ForgeResult<()> {
        registry.register(RuleKind::FileRule, "build/hf-*/*.otd", 1, |ctx, info| {
            let name = info.capture(1);
            let kanji = ctx.need_file(&format!("build/kanji0/{name}.ttf"))?;
            ctx.run(
                "otfccdump",
                vec![
                    path_str(&kanji.full),
                    "-o".to_string(),
                    info.id().to_string(),
                ],
            )?;
            Ok(TargetResult::Done)
        })?;

        registry.register(RuleKind::FileRule, "build/hf-*/*.hgl", 1, |ctx, info| {
            let (gid, name) = (info.capture(0), info.capture(1));
            let otd = ctx.need_file(&format!("build/hf-{gid}/{name}.otd"))?;
            ctx.run(
                ideohint(),
                vec![
                    "otd2hgl".to_string(),
                    path_str(&otd.full),
                    "-o".to_string(),
                    info.id().to_string(),
                    "--all".to_string(),
                ],
            )?;
            Ok(TargetResult::Done)
        })?;

        registry.register(RuleKind::FileRule, "build/hg-*/group.hgl", 1, |ctx, info| {
            let gid = info.capture(0);
            let hint: HintConfig = ctx.need_value("hinting-config")?;
            let shard_targets: Vec<String> = hint
                .inputs_of(gid)
                .iter()
                .map(|input| format!("build/hf-{gid}/{input}.hgl"))
                .collect();
            if shard_targets.is_empty() {
                return Err(ForgeError::value(format!(
                    "hinting group '{gid}' has no fonts in hinting-config.json"
                )));
            }
            let refs: Vec<&str> = shard_targets.iter().map(String::as_str).collect();
            let inputs = need_files(ctx, &refs)?;

            let mut args = vec![
                "merge".to_string(),
                "-o".to_string(),
                info.id().to_string(),
            ];
            args.extend(inputs.iter().map(|a| path_str(&a.full)));
            ctx.run(ideohint(), args)?;
            Ok(TargetResult::Done)
        })?;

        registry.register(RuleKind::FileRule, "build/hg-*/j-*.hgi", 1, |ctx, info| {
            let (gid, index) = (info.capture(0), info.capture(1));
            let jobs: usize = ctx.need_value("hinting-jobs")?;
            let hgl = ctx.need_file(&format!("build/hg-{gid}/group.hgl"))?;
            let params = ctx.source(format!("hinting-params/{gid}.toml"))?;
            ctx.run(
                ideohint(),
                vec![
                    "hint".to_string(),
                    path_str(&hgl.full),
                    "-o".to_string(),
                    info.id().to_string(),
                    "--parameters".to_string(),
                    path_str(&params.full),
                    "--cache".to_string(),
                    format!("build/{gid}.hgc"),
                    "-d".to_string(),
                    jobs.to_string(),
                    "-m".to_string(),
                    index.to_string(),
                ],
            )?;
            Ok(TargetResult::Done)
        })?;

        // The hint cache is shared mutable state keyed by group; every
        // consumer goes through this task so it is rebuilt at most once.
        registry.register(RuleKind::TaskGroup, "cache-hint-*", 1, |ctx, info| {
            let gid = info.capture(0);
            let jobs: usize = ctx.need_value("hinting-jobs")?;
            ctx.make_dirs("build")?;
            let shard_targets: Vec<String> = (0..jobs)
                .map(|j| format!("build/hg-{gid}/j-{j}.hgi"))
                .collect();
            let refs: Vec<&str> = shard_targets.iter().map(String::as_str).collect();
            let shards = need_files(ctx, &refs)?;

            let cache = format!("build/{gid}.hgc");
            let mut args = vec![
                "cache".to_string(),
                "-o".to_string(),
                cache.clone(),
                cache,
            ];
            args.extend(shards.iter().map(|a| path_str(&a.full)));
            ctx.run(ideohint(), args)?;
            Ok(TargetResult::Done)
        })?;

        registry.register(RuleKind::FileRule, "build/kanji1/*.ttf", 1, |ctx, info| {
            let name = info.capture(0);
            let hint: HintConfig = ctx.need_value("hinting-config")?;
            let gid = hint.group_of(name)?.to_string();
            let in_otd = ctx.need_file(&format!("build/hf-{gid}/{name}.otd"))?;
            let params = ctx.source(format!("hinting-params/{gid}.toml"))?;
            ctx.need_one(&format!("cache-hint-{gid}"))?;

            let otd = format!("{}/{}.otd", info.dir(), name);
            let mut args = vec![
                "apply".to_string(),
                format!("build/{gid}.hgc"),
                path_str(&in_otd.full),
                "-o".to_string(),
                otd.clone(),
                "--parameters".to_string(),
                path_str(&params.full),
            ];
            if let Some(padding) = hint.settings.cvt_padding {
                args.push("--CVT_PADDING".to_string());
                args.push(padding.to_string());
            }
            if let Some(padding) = hint.settings.fpgm_padding {
                args.push("--FPGM_PADDING".to_string());
                args.push(padding.to_string());
            }
            if hint.settings.use_vtt_shell {
                args.push("--padvtt".to_string());
            }
            ctx.run(ideohint(), args)?;

            ctx.run(
                "otfccbuild",
                vec![
                    otd.clone(),
                    "-o".to_string(),
                    info.id().to_string(),
                    "--keep-average-char-width".to_string(),
                ],
            )?;
            ctx.remove(&otd)?;
            Ok(TargetResult::Done)
        })?;

        Ok(())
    }

    fn register_collections(&self, registry: &mut Registry) -> ForgeResult<()> {
        let prefix = self.prefix.clone();
        registry.register(
            RuleKind::TaskGroup,
            &format!("out/ttc/{}-*-parts", self.prefix),
            1,
            move |ctx, info| {
                let style = info.capture(0);
                let config: BuildConfig = ctx.need_value("config")?;
                ctx.make_dirs("out/ttc")?;

                let mut font_targets = Vec::new();
                for family in &config.family_order {
                    for subfamily in &config.subfamily_order {
                        font_targets
                            .push(format!("out/ttf/{prefix}-{family}-{subfamily}-{style}.ttf"));
                    }
                }
                let refs: Vec<&str> = font_targets.iter().map(String::as_str).collect();
                let fonts = need_files(ctx, &refs)?;

                let mut args = vec![
                    "--prefix".to_string(),
                    format!("out/ttc/{prefix}-{style}-parts"),
                ];
                args.extend(fonts.iter().map(|a| path_str(&a.full)));
                args.push("-k".to_string());
                args.push("-h".to_string());
                ctx.run(ttcize(), args)?;
                Ok(TargetResult::Done)
            },
        )?;

        let prefix = self.prefix.clone();
        registry.register(
            RuleKind::FileRule,
            &format!("out/ttc/{}-*-parts.*.otd", self.prefix),
            1,
            // The ttcize run produces every part in one shot; this rule just
            // binds each part file to that task.
            move |ctx, info| {
                let style = info.capture(0);
                ctx.need_one(&format!("out/ttc/{prefix}-{style}-parts"))?;
                Ok(TargetResult::Done)
            },
        )?;

        registry.register(
            RuleKind::FileRule,
            &format!("out/ttc/{}-*-parts.*.ttf", self.prefix),
            1,
            |ctx, info| {
                let otd = ctx.need_file(&format!("{}/{}.otd", info.dir(), info.name()))?;
                ctx.run(
                    "otfccbuild",
                    vec![
                        path_str(&otd.full),
                        "-o".to_string(),
                        info.id().to_string(),
                        "-k".to_string(),
                        "--subroutinize".to_string(),
                        "--keep-average-char-width".to_string(),
                    ],
                )?;
                Ok(TargetResult::Done)
            },
        )?;

        let prefix = self.prefix.clone();
        registry.register(
            RuleKind::FileRule,
            &format!("out/ttc/{}-*.ttc", self.prefix),
            1,
            move |ctx, info| {
                let style = info.capture(0);
                let config: BuildConfig = ctx.need_value("config")?;
                let count = config.family_order.len() * config.subfamily_order.len();
                let part_targets: Vec<String> = (0..count)
                    .map(|n| format!("out/ttc/{prefix}-{style}-parts.{n}.ttf"))
                    .collect();
                let refs: Vec<&str> = part_targets.iter().map(String::as_str).collect();
                let parts = need_files(ctx, &refs)?;

                let mut args = vec!["-o".to_string(), info.id().to_string()];
                args.extend(parts.iter().map(|a| path_str(&a.full)));
                ctx.run("otf2otc", args)?;

                for part in &parts {
                    ctx.remove(&part.full)?;
                    ctx.remove(part.dir().join(format!("{}.otd", part.name())))?;
                }
                Ok(TargetResult::Done)
            },
        )?;

        let prefix = self.prefix.clone();
        registry.register(RuleKind::TaskGroup, "ttc", 1, move |ctx, _| {
            let config: BuildConfig = ctx.need_value("config")?;
            ctx.make_dirs("out/ttc")?;
            let targets: Vec<String> = config
                .style_order
                .iter()
                .map(|style| format!("out/ttc/{prefix}-{style}.ttc"))
                .collect();
            let refs: Vec<&str> = targets.iter().map(String::as_str).collect();
            ctx.need(&refs)?;
            Ok(TargetResult::Done)
        })?;

        let prefix = self.prefix.clone();
        registry.register(RuleKind::TaskGroup, "ttf", 1, move |ctx, _| {
            let config: BuildConfig = ctx.need_value("config")?;
            ctx.make_dirs("out/ttf")?;
            let mut targets = Vec::new();
            for family in &config.family_order {
                for subfamily in &config.subfamily_order {
                    for style in &config.style_order {
                        targets.push(format!(
                            "out/ttf/{prefix}-{family}-{subfamily}-{style}.ttf"
                        ));
                    }
                }
            }
            let refs: Vec<&str> = targets.iter().map(String::as_str).collect();
            ctx.need(&refs)?;
            Ok(TargetResult::Done)
        })?;

        Ok(())
    }

    fn register_archives(&self, registry: &mut Registry) -> ForgeResult<()> {
        registry.register(
            RuleKind::FileRule,
            &format!("out/{}-ttc-*.7z", self.prefix),
            1,
            |ctx, info| {
                ctx.need_one("ttc")?;
                ctx.run_in(
                    "out/ttc",
                    "7z",
                    vec![
                        "a".to_string(),
                        "-t7z".to_string(),
                        "-mmt=on".to_string(),
                        SEVENZIP_LZMA.to_string(),
                        format!("../{}.7z", info.name()),
                        "*.ttc".to_string(),
                    ],
                )?;
                Ok(TargetResult::Done)
            },
        )?;

        registry.register(
            RuleKind::FileRule,
            &format!("out/{}-ttf-*.7z", self.prefix),
            1,
            |ctx, info| {
                let config: BuildConfig = ctx.need_value("config")?;
                ctx.need_one("ttf")?;
                // 7z appends into an existing archive.
                ctx.remove(info.id())?;

                // The style order interlaces upright with italic; compressing
                // each pair in one pass shrinks the archive.
                let styles = &config.style_order;
                let mut i = 0;
                while i < styles.len() {
                    let mut args = vec![
                        "a".to_string(),
                        "-t7z".to_string(),
                        "-mmt=on".to_string(),
                        SEVENZIP_LZMA.to_string(),
                        format!("../{}.7z", info.name()),
                        format!("*-{}.ttf", styles[i]),
                    ];
                    if let Some(italic) = styles.get(i + 1) {
                        args.push(format!("*-{italic}.ttf"));
                    }
                    ctx.run_in("out/ttf", "7z", args)?;
                    i += 2;
                }
                Ok(TargetResult::Done)
            },
        )?;

        let prefix = self.prefix.clone();
        registry.register(RuleKind::Phony, "start", 1, move |ctx, _| {
            let version: String = ctx.need_value("version")?;
            let ttc_archive = format!("out/{prefix}-ttc-{version}.7z");
            let ttf_archive = format!("out/{prefix}-ttf-{version}.7z");
            ctx.need(&[ttc_archive.as_str(), ttf_archive.as_str()])?;
            Ok(TargetResult::Done)
        })?;

        Ok(())
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new(DEFAULT_PREFIX)
    }
}

const SEVENZIP_LZMA: &str = "-m0=LZMA:a=0:d=1536m:fb=256";

/// Width/AS punctuation normalization; ws0 and as0 differ only in the
/// helper script they run.
fn register_punct(
    registry: &mut Registry,
    stage: &'static str,
    recipe: &'static str,
) -> ForgeResult<()> {
    registry.register(
        RuleKind::FileRule,
        &format!("build/{stage}/*-*-*.ttf"),
        1,
        move |ctx, info| {
            let config: BuildConfig = ctx.need_value("config")?;
            ctx.need_one("scripts")?;
            let (family, region, style) = (info.capture(0), info.capture(1), info.capture(2));
            let shs = ctx.need_file(&format!("build/shs/{region}-{style}.otd"))?;
            let traits = config.family(family)?;

            let tmp_otd = format!("{}/{}.otd", info.dir(), info.name());
            run_script(
                ctx,
                recipe,
                &ToolOptions::new()
                    .value("main", path_str(&shs.full))
                    .value("o", &tmp_otd)
                    .flag("mono", traits.is_mono)
                    .flag("type", traits.is_type)
                    .flag("pwid", traits.is_pwid)
                    .flag("term", traits.is_term),
            )?;
            ctx.run(
                "otfccbuild",
                vec![
                    tmp_otd.clone(),
                    "-o".to_string(),
                    info.id().to_string(),
                    "-q".to_string(),
                ],
            )?;
            ctx.remove(&tmp_otd)?;
            Ok(TargetResult::Done)
        },
    )?;
    Ok(())
}

/// Runs a node helper script under the `run` recipe harness.
fn run_script(ctx: &BuildContext<'_>, recipe: &str, options: &ToolOptions) -> ForgeResult<()> {
    let mut args = vec![
        "run".to_string(),
        "--recipe".to_string(),
        recipe.to_string(),
    ];
    args.extend(options.to_args());
    ctx.run("node", args)
}

/// Round-trips a merged font through ttx to shed broken tables, then runs
/// ttfautohint into the final location and cleans the intermediates.
fn sanitize(ctx: &BuildContext<'_>, target: &str, raw: &str) -> ForgeResult<()> {
    let tmp_ttx = format!("{raw}.ttx");
    let tmp_ttf = format!("{raw}.2.ttf");
    ctx.run("ttx", ["-q", "-o", tmp_ttx.as_str(), raw])?;
    ctx.run("ttx", ["-q", "-o", tmp_ttf.as_str(), tmp_ttx.as_str()])?;
    ctx.run("ttfautohint", [tmp_ttf.as_str(), target])?;
    ctx.remove(raw)?;
    ctx.remove(&tmp_ttx)?;
    ctx.remove(&tmp_ttf)?;
    Ok(())
}

/// Requests several file targets in parallel, returning their artifacts in
/// request order.
fn need_files(ctx: &BuildContext<'_>, targets: &[&str]) -> ForgeResult<Vec<Artifact>> {
    let results = ctx.need(targets)?;
    targets
        .iter()
        .zip(results)
        .map(|(target, result)| {
            result
                .as_file()
                .cloned()
                .ok_or_else(|| ForgeError::value(format!("target '{target}' is not file-backed")))
        })
        .collect()
}

fn path_str(path: &Path) -> String {
    path.display().to_string()
}

fn ideohint() -> &'static str {
    if cfg!(windows) {
        "node_modules/.bin/ideohint.cmd"
    } else {
        "node_modules/.bin/ideohint"
    }
}

fn ttcize() -> &'static str {
    if cfg!(windows) {
        "node_modules/.bin/otfcc-ttcize.cmd"
    } else {
        "node_modules/.bin/otfcc-ttcize"
    }
}

/// Reads and parses a JSON file relative to the project root.
fn read_json(path: &str) -> ForgeResult<serde_json::Value> {
    let text = std::fs::read_to_string(path).map_err(|e| ActionError::Io {
        path: path.to_string(),
        message: e.to_string(),
    })?;
    serde_json::from_str(&text).map_err(|e| ForgeError::value(format!("{path}: {e}")))
}

/// Recursively collects `.js` files under `dir`; a missing directory means
/// no scripts.
fn collect_scripts(dir: &Path, out: &mut Vec<String>) -> ForgeResult<()> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => {
            return Err(ActionError::Io {
                path: dir.display().to_string(),
                message: e.to_string(),
            }
            .into())
        }
    };
    for entry in entries {
        let entry = entry.map_err(|e| ActionError::Io {
            path: dir.display().to_string(),
            message: e.to_string(),
        })?;
        let path = entry.path();
        if path.is_dir() {
            collect_scripts(&path, out)?;
        } else if path.extension().is_some_and(|ext| ext == "js") {
            out.push(path.display().to_string());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_builds_cleanly() {
        let registry = Pipeline::default().build_registry().unwrap();
        assert!(!registry.is_empty());
    }

    #[test]
    fn test_representative_targets_resolve_uniquely() {
        let registry = Pipeline::default().build_registry().unwrap();

        for target in [
            "config",
            "version",
            "hinting-jobs",
            "scripts",
            "hinting-settings",
            "start",
            "ttf",
            "ttc",
            "build/shs/sc-regular.otd",
            "build/ws0/gothic-sc-regular.ttf",
            "build/as0/gothic-sc-regular.ttf",
            "build/pass1/gothic-sc-italic.ttf",
            "build/kanji0/sc-regular.ttf",
            "build/hf-sc/sc-regular.otd",
            "build/hf-sc/sc-regular.hgl",
            "build/hg-sc/group.hgl",
            "build/hg-sc/j-3.hgi",
            "cache-hint-sc",
            "build/kanji1/sc-regular.ttf",
            "out/ttf/sarasa-gothic-sc-regular.ttf",
            "out/ttc/sarasa-regular-parts",
            "out/ttc/sarasa-regular-parts.0.otd",
            "out/ttc/sarasa-regular-parts.0.ttf",
            "out/ttc/sarasa-regular.ttc",
            "out/sarasa-ttc-0.10.2.7z",
            "out/sarasa-ttf-0.10.2.7z",
        ] {
            let resolved = registry.resolve(target);
            assert!(resolved.is_ok(), "target '{target}': {resolved:?}");
        }
    }

    #[test]
    fn test_production_font_captures() {
        let registry = Pipeline::default().build_registry().unwrap();
        let (_, caps) = registry
            .resolve("out/ttf/sarasa-gothic-sc-regular.ttf")
            .unwrap();
        assert_eq!(caps, vec!["gothic", "sc", "regular"]);
    }

    #[test]
    fn test_hint_shard_captures_group_and_index() {
        let registry = Pipeline::default().build_registry().unwrap();
        let (_, caps) = registry.resolve("build/hg-sc/j-7.hgi").unwrap();
        assert_eq!(caps, vec!["sc", "7"]);
    }

    #[test]
    fn test_custom_prefix_changes_output_namespace() {
        let registry = Pipeline::new("inziu").build_registry().unwrap();
        assert!(registry.resolve("out/ttf/inziu-gothic-sc-regular.ttf").is_ok());
        assert!(registry.resolve("out/ttf/sarasa-gothic-sc-regular.ttf").is_err());
    }
}
