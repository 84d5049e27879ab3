//! `kiln settings` command

use anyhow::Result;

use crate::cli::SettingsArgs;
use crate::commands::load_project;
use kiln::builder::settings::settings_path;
use kiln::util::shell::Shell;

pub fn execute(args: SettingsArgs, shell: &Shell) -> Result<i32> {
    let project = load_project(&args.config)?;
    let settings = kiln::generate(&project.config);
    let path = settings_path(project.config.build_root());

    if args.json {
        let value = serde_json::json!({
            "backend": project.config.backend(),
            "path": path,
            "digest": settings.digest(),
            "settings": settings,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        print!("{}", settings.render_cmake());
        shell.note(format!("{} (sha256 {})", path.display(), settings.digest()));
    }

    Ok(0)
}
