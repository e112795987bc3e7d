use std::env;

fn main() {
    // 告诉 cargo 在 build.rs 变化时重新运行
    println!("cargo:rerun-if-changed=build.rs");

    // 主机测试不需要固件链接配置
    let target = env::var("TARGET").unwrap_or_default();
    if !target.starts_with("xtensa-esp32s3") {
        return;
    }

    // esp-hal 1.0 的链接脚本
    println!("cargo:rustc-link-arg=-Tlinkall.x");

    // 添加 ld 目录到链接路径（如果有自定义链接脚本）
    if let Ok(manifest_dir) = env::var("CARGO_MANIFEST_DIR") {
        println!("cargo:rustc-link-search={}/ld", manifest_dir);
    }
}
