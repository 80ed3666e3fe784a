// 逐模块驱动循环：名称匹配 -> 动态段解析 -> PLT 补丁 -> 符号禁用 -> 汇总

use crate::api::{Diagnostics, PatchReport, PatchRequest, TargetOutcome};
use crate::elf::{DynamicState, ElfPhdr};
use crate::errno::Errno;
use crate::log;

pub(crate) fn scan_module(
    base_addr: usize,
    pathname: &str,
    phdrs: &[ElfPhdr],
    request: &PatchRequest,
) -> Option<PatchReport> {
    if request.target_module.is_empty() || !pathname.contains(request.target_module) {
        return None;
    }

    log::debug(format_args!(
        "matched module {} at base {:#x}",
        pathname, base_addr
    ));

    // 解析失败是硬性失败：不对无效模块做任何部分补丁
    let state = match unsafe { DynamicState::parse(base_addr, phdrs, pathname) } {
        Ok(state) => state,
        Err(err) => {
            log::error(format_args!(
                "failed to parse dynamic section of {}: {:?}",
                pathname, err
            ));
            return Some(PatchReport {
                errno: err,
                redirects: Vec::new(),
                disables: Vec::new(),
                soname_mismatch: false,
                diagnostics: None,
            });
        }
    };

    // DT_SONAME 与匹配名不一致说明加载器上报名与自声明名相左，仅告警
    let soname_mismatch = !unsafe { state.soname_matches(request.target_module) };
    if soname_mismatch {
        log::warn(format_args!(
            "DT_SONAME of {} does not declare {}",
            pathname, request.target_module
        ));
    }

    // 重定位补丁始终执行；符号禁用仅在调用方要求时执行
    let redirects = unsafe { state.patch_plt_relocs(request.redirects) };

    let mut disables: Vec<TargetOutcome> = Vec::new();
    if request.disable_enabled {
        for symbol in request.disable_symbols {
            let errno = match unsafe { state.disable_symbol(symbol) } {
                Ok(()) => Errno::Ok,
                Err(err) => err,
            };
            disables.push(TargetOutcome {
                sym_name: symbol.to_string(),
                errno,
            });
        }
    }

    let first_failure = redirects
        .iter()
        .chain(disables.iter())
        .find(|outcome| !outcome.is_ok())
        .map(|outcome| outcome.errno);

    let mut diagnostics = None;
    let errno = match first_failure {
        Some(err) => {
            // 任一目标失败时输出一条诊断记录，便于离线定位
            let (symtab, strtab, hash, relplt) = state.table_ptrs();
            log::info(format_args!(
                "patch diagnostics\nlibrary path: {}\naddrs: base={:#x} sym={:#x} str={:#x} hash={:#x} plt={:#x}",
                pathname, base_addr, symtab, strtab, hash, relplt
            ));
            diagnostics = Some(Diagnostics {
                base_addr,
                symtab,
                strtab,
                hash,
                relplt,
            });
            err
        }
        None => Errno::Ok,
    };

    Some(PatchReport {
        errno,
        redirects,
        disables,
        soname_mismatch,
        diagnostics,
    })
}
