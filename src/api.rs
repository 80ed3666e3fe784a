// 对外 API：补丁请求与结果类型、逐模块入口、dl_iterate_phdr 适配回调

use crate::elf::ElfPhdr;
use crate::errno::Errno;
use crate::patcher;
use std::ffi::{CStr, c_void};

// 与进程内先加载的另一套 C++ 运行时冲突的异常处理符号，按名禁用
// Android 10 的 libc 不含 _Unwind_RaiseException / _Unwind_Resume，保持可解析
pub const DISABLE_EXCEPTION_SYMBOLS: &[&str] = &[
    "__gxx_personality_v0",
    "__cxa_throw",
    "__cxa_rethrow",
    "__cxa_allocate_exception",
    "__cxa_end_catch",
    "__cxa_begin_catch",
    "__cxa_guard_abort",
    "__cxa_guard_acquire",
    "__cxa_guard_release",
    "__cxa_free_exception",
];

// 一条重定位重定向：导入符号名 -> 本地替换函数地址
#[derive(Clone, Copy, Debug)]
pub struct Redirect<'a> {
    pub sym_name: &'a str,
    pub new_func: *mut c_void,
}

// 单次补丁调用的全部输入；显式传入，不依赖进程级可变状态
#[derive(Clone, Copy, Debug)]
pub struct PatchRequest<'a> {
    // 目标模块名子串，命中才继续处理
    pub target_module: &'a str,
    pub redirects: &'a [Redirect<'a>],
    pub disable_symbols: &'a [&'a str],
    // 仅在显式要求时才执行符号禁用
    pub disable_enabled: bool,
}

// 单个目标符号的处理结果
#[derive(Clone, Debug)]
pub struct TargetOutcome {
    pub sym_name: String,
    pub errno: Errno,
}

impl TargetOutcome {
    pub fn is_ok(&self) -> bool {
        self.errno.is_ok()
    }
}

// 失败时附带的模块基址与原始表指针，用于离线诊断
#[derive(Clone, Copy, Debug)]
pub struct Diagnostics {
    pub base_addr: usize,
    pub symtab: usize,
    pub strtab: usize,
    pub hash: usize,
    pub relplt: usize,
}

// 单个模块的补丁汇总结果
#[derive(Clone, Debug)]
pub struct PatchReport {
    // 整体状态：所有子操作成功才为 Ok
    pub errno: Errno,
    pub redirects: Vec<TargetOutcome>,
    pub disables: Vec<TargetOutcome>,
    // DT_SONAME 与匹配名不一致（仅告警，不影响状态）
    pub soname_mismatch: bool,
    pub diagnostics: Option<Diagnostics>,
}

impl PatchReport {
    pub fn is_ok(&self) -> bool {
        self.errno.is_ok()
    }
}

// 设置日志级别，启用时输出 DEBUG 及以上
pub fn set_debug(debug: bool) {
    crate::log::set_debug_enabled(debug);
}

// 逐模块入口：名称不匹配返回 None，匹配则返回补丁汇总
pub fn scan_module(
    base_addr: usize,
    pathname: &str,
    phdrs: &[ElfPhdr],
    request: &PatchRequest,
) -> Option<PatchReport> {
    patcher::scan_module(base_addr, pathname, phdrs, request)
}

// dl_iterate_phdr 回调的上下文：请求与结果槽
pub struct ScanContext<'a> {
    pub request: PatchRequest<'a>,
    pub report: Option<PatchReport>,
}

// 与 libc::dl_iterate_phdr 签名兼容的回调；data 必须指向 ScanContext
// 命中目标模块后返回 1 终止遍历，其余模块返回 0
pub unsafe extern "C" fn visit_phdr(
    info: *mut libc::dl_phdr_info,
    _size: libc::size_t,
    data: *mut c_void,
) -> libc::c_int {
    if info.is_null() || data.is_null() {
        return 0;
    }
    let ctx = &mut *(data as *mut ScanContext);
    let info = &*info;
    if info.dlpi_name.is_null() {
        return 0;
    }
    let pathname = match CStr::from_ptr(info.dlpi_name).to_str() {
        Ok(value) => value,
        Err(_) => return 0,
    };
    let phdrs = if info.dlpi_phdr.is_null() {
        &[][..]
    } else {
        std::slice::from_raw_parts(info.dlpi_phdr as *const ElfPhdr, info.dlpi_phnum as usize)
    };

    match patcher::scan_module(info.dlpi_addr as usize, pathname, phdrs, &ctx.request) {
        Some(report) => {
            ctx.report = Some(report);
            1
        }
        None => 0,
    }
}
