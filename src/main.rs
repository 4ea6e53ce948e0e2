use anyhow::Result;
use console::{Term, style};
use log::{info, warn};
use video_chunk_grid::config::Config;
use video_chunk_grid::init;
use video_chunk_grid::menu::show_main_menu;

fn main() -> Result<()> {
    init::init();
    let term = Term::stdout();

    let mut config = Config::new()?;

    loop {
        match show_main_menu(&term, &mut config) {
            Ok(true) => {}
            Ok(false) => {
                term.clear_screen()?;
                println!("\n{}", style("再見！").green().bold());
                info!("Program exited normally");
                break;
            }
            Err(e) => {
                warn!("Program error: {e}");
                eprintln!("{} {}", style("錯誤:").red().bold(), e);
                break;
            }
        }
    }

    Ok(())
}
