//! Resolve command

use std::time::Duration;

use anyhow::{Context, Result};
use accelspec_core::exec::{GroupOutcome, InstallPlan, PipTool};
use accelspec_core::Assembler;
use accelspec_schema::ModuleBuildSpec;

use crate::{GlobalArgs, ResolveArgs};

/// Run any requested pip installs, then resolve and print every module.
pub fn resolve(global: &GlobalArgs, args: &ResolveArgs) -> Result<()> {
    let plan = InstallPlan {
        groups: args.pip_install.clone(),
        index_url: args.index_url.clone(),
        rl_groups: args.rl_pip_install.clone(),
        rl_index_urls: args.rl_index_url.clone(),
    };
    if plan != InstallPlan::default() {
        let mut pip = PipTool::new(&args.python).verbose(global.verbose >= 3);
        if let Some(secs) = args.pip_timeout {
            pip = pip.timeout(Duration::from_secs(secs));
        }
        for outcome in plan.perform(&pip)? {
            match outcome {
                GroupOutcome::Installed(reqs) if !reqs.is_empty() => {
                    eprintln!("===== pip installed {reqs:?}");
                }
                GroupOutcome::Installed(_) => {}
                GroupOutcome::BackedOut { failed, removed } => {
                    eprintln!("!!!!! pip could not install {failed}, uninstalled {removed:?}");
                }
            }
        }
    }

    let ctx = super::context(global)?;
    let cache = super::resource_cache(global, &ctx)?;
    let resolution = Assembler::new(&ctx, &cache)
        .resolve()
        .context("Failed to resolve accelerator modules")?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&resolution.specs)?);
        eprint!("{}", summary(&resolution.log.to_string()));
    } else {
        for spec in &resolution.specs {
            print_spec(spec);
        }
        print!("{}", summary(&resolution.log.to_string()));
    }
    Ok(())
}

fn summary(lines: &str) -> String {
    format!("{0}\n##### SUMMARY INFO:\n{0}\n{lines}", "#".repeat(48))
}

fn print_spec(spec: &ModuleBuildSpec) {
    println!("{}", spec.module_name);
    for f in &spec.source_files {
        println!("  source   {}", f.display());
    }
    for d in &spec.include_dirs {
        println!("  include  {}", d.display());
    }
    for (name, value) in &spec.macros {
        match value {
            Some(v) => println!("  define   {name}={v}"),
            None => println!("  define   {name}"),
        }
    }
    for d in &spec.library_dirs {
        println!("  libdir   {}", d.display());
    }
    for l in &spec.library_names {
        println!("  link     {l}");
    }
    println!();
}
