//! # 美化输出工具
//!
//! 提供统一的终端输出样式。面向用户的消息走这里，
//! 引擎级诊断信息走 `log`。
//!
//! ## 依赖关系
//! - 被所有 `commands/` 模块使用
//! - 使用 `models/detector.rs`
//! - 使用 `colored` crate

use crate::models::Detector;

use colored::Colorize;

/// 打印错误消息
pub fn print_error(msg: &str) {
    eprintln!("{} {}", "[ERR]".red().bold(), msg);
}

/// 打印警告消息
pub fn print_warning(msg: &str) {
    println!("{} {}", "[WARN]".yellow().bold(), msg);
}

/// 打印信息消息
pub fn print_info(msg: &str) {
    println!("{} {}", "[*]".blue().bold(), msg);
}

/// 打印跳过消息
pub fn print_skip(msg: &str) {
    println!("{} {}", "[SKIP]".dimmed(), msg);
}

/// 打印完成消息
pub fn print_done(msg: &str) {
    println!("{} {}", "[DONE]".green().bold(), msg);
}

/// 打印转换成功消息 (输入 -> 输出)
pub fn print_conversion(from: &str, to: &str) {
    println!(
        "{} {} {} {}",
        "[OK]".green().bold(),
        from.dimmed(),
        "->".cyan(),
        to
    );
}

/// 打印标题栏
pub fn print_header(title: &str) {
    let line = "─".repeat(60);
    println!("\n{}", line.dimmed());
    println!("  {}", title.bold());
    println!("{}\n", line.dimmed());
}

/// 打印键值对，键左对齐
pub fn print_field(key: &str, value: &str) {
    println!("  {:<22} {}", key.dimmed(), value);
}

/// 探测器概要：面板数与面板尺寸（尺寸一致时只打印一次）
pub fn print_detector_summary(detector: &Detector) {
    print_field("Panels", &detector.len().to_string());
    print_field("Panel size (fast x slow)", &panel_sizes(detector));
}

fn panel_sizes(detector: &Detector) -> String {
    match detector.uniform_image_size() {
        Ok([f, s]) => format!("{}x{}", f, s),
        Err(_) => {
            let mut sizes: Vec<String> = detector
                .iter()
                .map(|p| format!("{}x{}", p.image_size[0], p.image_size[1]))
                .collect();
            sizes.dedup();
            sizes.join(", ")
        }
    }
}
