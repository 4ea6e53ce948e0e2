use crate::config::Config;
use crate::config::save::save_settings;
use crate::menu::handlers::{run_single_video_extraction, run_timeline_extraction};
use anyhow::Result;
use console::{Term, style};
use dialoguer::theme::ColorfulTheme;
use dialoguer::{Input, Select};

const ESC_HINT: &str = "按 ESC 返回";

pub fn show_main_menu(term: &Term, config: &mut Config) -> Result<bool> {
    term.clear_screen()?;

    println!("{}", style("=== 空拍影片截圖與片段擷取 ===").cyan().bold());
    println!("{}", style(ESC_HINT).dim());

    let options = main_menu_options(config);

    let selection = Select::with_theme(&ColorfulTheme::default())
        .with_prompt("請選擇功能")
        .items(&options)
        .default(0)
        .interact_on_opt(term)?;

    match selection {
        Some(0) => {
            run_timeline_extraction(term, config)?;
            Ok(true)
        }
        Some(1) => {
            run_single_video_extraction(term, config)?;
            Ok(true)
        }
        Some(2) => {
            show_settings_menu(term, config)?;
            Ok(true)
        }
        Some(3) | None => Ok(false), // ESC pressed - exit
        _ => unreachable!(),
    }
}

fn main_menu_options(config: &Config) -> Vec<String> {
    vec![
        format!(
            "多檔時間軸擷取（截圖 + {} 秒片段）",
            config.settings.extraction.clip_duration
        ),
        format!(
            "單一影片擷取（截圖 + {} 秒片段）",
            config.settings.single_video.clip_duration
        ),
        "設定".to_string(),
        "離開".to_string(),
    ]
}

/// 設定選單
fn show_settings_menu(term: &Term, config: &mut Config) -> Result<()> {
    loop {
        term.clear_screen()?;

        println!("{}", style("=== 設定 ===").cyan().bold());
        println!("{}", style(ESC_HINT).dim());

        let extraction = &config.settings.extraction;
        let single = &config.settings.single_video;
        let options = vec![
            format!("擷取間隔（目前 {} 秒）", extraction.interval),
            format!("片段長度（目前 {} 秒）", extraction.clip_duration),
            format!("輸出高度（目前 {}）", extraction.output_height),
            format!("輸出幀率（目前 {} fps）", extraction.output_fps),
            format!(
                "網格（目前 {}x{}，線寬 {}）",
                extraction.grid.rows, extraction.grid.cols, extraction.grid.line_width
            ),
            format!("單一影片片段長度（目前 {} 秒）", single.clip_duration),
            "返回".to_string(),
        ];

        let selection = Select::with_theme(&ColorfulTheme::default())
            .with_prompt("請選擇要修改的項目")
            .items(&options)
            .default(0)
            .interact_on_opt(term)?;

        let changed = match selection {
            Some(0) => edit_seconds(
                "擷取間隔（秒）",
                &mut config.settings.extraction.interval,
            )?,
            Some(1) => edit_seconds(
                "片段長度（秒）",
                &mut config.settings.extraction.clip_duration,
            )?,
            Some(2) => edit_output_height(&mut config.settings.extraction.output_height)?,
            Some(3) => edit_positive_u32(
                "輸出幀率（fps）",
                &mut config.settings.extraction.output_fps,
            )?,
            Some(4) => edit_grid(config)?,
            Some(5) => edit_seconds(
                "單一影片片段長度（秒）",
                &mut config.settings.single_video.clip_duration,
            )?,
            Some(6) | None => break, // ESC or back
            _ => unreachable!(),
        };

        if changed {
            save_settings(&config.settings)?;
            println!("\n{}", style("設定已儲存").green());
            std::thread::sleep(std::time::Duration::from_secs(1));
        }
    }

    Ok(())
}

fn edit_seconds(prompt: &str, value: &mut u64) -> Result<bool> {
    let input: u64 = Input::with_theme(&ColorfulTheme::default())
        .with_prompt(prompt)
        .default(*value)
        .validate_with(|v: &u64| -> Result<(), &'static str> {
            if *v > 0 { Ok(()) } else { Err("必須大於 0") }
        })
        .interact_text()?;

    Ok(replace_if_changed(value, input))
}

fn edit_positive_u32(prompt: &str, value: &mut u32) -> Result<bool> {
    let input: u32 = Input::with_theme(&ColorfulTheme::default())
        .with_prompt(prompt)
        .default(*value)
        .validate_with(|v: &u32| -> Result<(), &'static str> {
            if *v > 0 { Ok(()) } else { Err("必須大於 0") }
        })
        .interact_text()?;

    Ok(replace_if_changed(value, input))
}

fn edit_output_height(value: &mut u32) -> Result<bool> {
    let input: u32 = Input::with_theme(&ColorfulTheme::default())
        .with_prompt("輸出高度（像素）")
        .default(*value)
        .validate_with(|v: &u32| -> Result<(), &'static str> {
            if *v > 0 && v % 2 == 0 {
                Ok(())
            } else {
                Err("必須為正偶數")
            }
        })
        .interact_text()?;

    Ok(replace_if_changed(value, input))
}

fn edit_grid(config: &mut Config) -> Result<bool> {
    let grid = &mut config.settings.extraction.grid;
    let rows = edit_positive_u32("網格列數", &mut grid.rows)?;
    let cols = edit_positive_u32("網格欄數", &mut grid.cols)?;
    let width = edit_positive_u32("線寬（像素）", &mut grid.line_width)?;
    Ok(rows || cols || width)
}

fn replace_if_changed<T: PartialEq>(slot: &mut T, value: T) -> bool {
    if *slot == value {
        return false;
    }
    *slot = value;
    true
}
