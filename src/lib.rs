#![allow(dead_code)]
#![allow(unsafe_op_in_unsafe_fn)]
#![allow(clippy::missing_safety_doc)]

#[cfg(not(any(target_os = "android", target_os = "linux")))]
compile_error!("sopatch supports Android and Linux only");

#[cfg(not(any(target_arch = "arm", target_arch = "aarch64", target_arch = "x86_64")))]
compile_error!("sopatch supports only arm and aarch64 (x86_64 is accepted for host development)");

// 公共 API 层：补丁请求、结果汇总、dl_iterate_phdr 适配回调
mod api;
// ELF 解析核心：动态段、SysV hash、符号表、PLT 重定位表
mod elf;
// 错误码定义
mod errno;
// 日志输出：Android 上走 logcat，宿主机上走 stderr
mod log;
// 内存页面保护：/proc/self/maps 查询与作用域保护守卫
mod memory;
// 逐模块驱动循环：名称匹配、解析、打补丁、诊断汇总
mod patcher;
// 版本信息
mod version;

pub use api::{
    DISABLE_EXCEPTION_SYMBOLS, Diagnostics, PatchReport, PatchRequest, Redirect, ScanContext,
    TargetOutcome, scan_module, set_debug, visit_phdr,
};
pub use elf::ElfPhdr;
pub use errno::Errno as SopatchErrno;
pub use version::{version, version_str, version_str_full};
