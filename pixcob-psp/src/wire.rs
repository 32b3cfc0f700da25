//! Wire format of the PSP charge API (COBV).
//!
//! Request and response bodies are explicit serde structs so a missing
//! field is a compile error here rather than a runtime surprise at the
//! PSP. Field names follow the Bacen-style Portuguese contract
//! (`calendario`, `devedor`, `valor`, `chave`, `solicitacaoPagador`).

use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use pixcob::amount;
use pixcob::charge::{ChargeStatus, DocumentKind, Payer, Settlement};
use pixcob::error::PspError;
use pixcob::protocol::{ChargeUpdate, CreateChargeDue, PspCharge};

/// `modalidade` 2 on both `multa` and `juros` selects percent-based terms.
const FEE_MODE_PERCENT: u8 = 2;

/// Payer-facing description cap on the COBV contract.
const DESCRIPTION_MAX_LEN: usize = 140;

#[derive(Debug, Serialize)]
pub(crate) struct CobvCreateBody {
    calendario: Calendar,
    devedor: DebtorBody,
    valor: ChargeValue,
    chave: String,
    #[serde(rename = "solicitacaoPagador", skip_serializing_if = "Option::is_none")]
    solicitacao_pagador: Option<String>,
}

#[derive(Debug, Serialize)]
struct Calendar {
    #[serde(rename = "dataDeVencimento")]
    data_de_vencimento: NaiveDate,
    #[serde(rename = "validadeAposVencimento")]
    validade_apos_vencimento: u32,
}

#[derive(Debug, Serialize)]
struct DebtorBody {
    nome: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    cpf: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    cnpj: Option<String>,
}

impl From<&pixcob::charge::Debtor> for DebtorBody {
    fn from(debtor: &pixcob::charge::Debtor) -> Self {
        let (cpf, cnpj) = match debtor.document_kind() {
            DocumentKind::Cpf => (Some(debtor.document.clone()), None),
            DocumentKind::Cnpj => (None, Some(debtor.document.clone())),
        };
        Self {
            nome: debtor.name.clone(),
            cpf,
            cnpj,
        }
    }
}

#[derive(Debug, Serialize)]
struct ChargeValue {
    original: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    multa: Option<FeeTerm>,
    #[serde(skip_serializing_if = "Option::is_none")]
    juros: Option<FeeTerm>,
}

#[derive(Debug, Serialize)]
struct FeeTerm {
    modalidade: u8,
    #[serde(rename = "valorPerc")]
    valor_perc: String,
}

impl FeeTerm {
    fn percent(value: Decimal) -> Option<Self> {
        (value > Decimal::ZERO).then(|| Self {
            modalidade: FEE_MODE_PERCENT,
            valor_perc: amount::format_brl(value),
        })
    }
}

impl From<&CreateChargeDue> for CobvCreateBody {
    fn from(request: &CreateChargeDue) -> Self {
        let mut description = request.description.trim().to_owned();
        if description.len() > DESCRIPTION_MAX_LEN {
            let mut cut = DESCRIPTION_MAX_LEN;
            while !description.is_char_boundary(cut) {
                cut -= 1;
            }
            description.truncate(cut);
        }
        Self {
            calendario: Calendar {
                data_de_vencimento: request.due_date,
                validade_apos_vencimento: request.validity_after_due_days,
            },
            devedor: DebtorBody::from(&request.debtor),
            valor: ChargeValue {
                original: amount::format_brl(request.amount),
                multa: FeeTerm::percent(request.late_fee_percent),
                juros: FeeTerm::percent(request.monthly_interest_percent),
            },
            chave: request.pix_key.clone(),
            solicitacao_pagador: (!description.is_empty()).then_some(description),
        }
    }
}

/// PATCH body carrying only the supplied fields.
#[derive(Debug, Serialize)]
pub(crate) struct CobvPatchBody {
    #[serde(skip_serializing_if = "Option::is_none")]
    devedor: Option<DebtorBody>,
    #[serde(skip_serializing_if = "Option::is_none")]
    valor: Option<PatchValue>,
    #[serde(rename = "solicitacaoPagador", skip_serializing_if = "Option::is_none")]
    solicitacao_pagador: Option<String>,
}

#[derive(Debug, Serialize)]
struct PatchValue {
    original: String,
}

impl From<&ChargeUpdate> for CobvPatchBody {
    fn from(update: &ChargeUpdate) -> Self {
        Self {
            devedor: update.debtor.as_ref().map(DebtorBody::from),
            valor: update.amount.map(|a| PatchValue {
                original: amount::format_brl(a),
            }),
            solicitacao_pagador: update.description.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct CobvResponseBody {
    pub txid: String,
    pub status: ChargeStatus,
    #[serde(default, rename = "revisao")]
    pub revision: Option<u32>,
    #[serde(default)]
    pub loc: Option<Loc>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default, rename = "pixCopiaECola")]
    pub pix_copia_e_cola: Option<String>,
    #[serde(default)]
    pub pix: Vec<PixEvent>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Loc {
    #[serde(default)]
    pub location: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PixEvent {
    #[serde(rename = "endToEndId")]
    pub end_to_end_id: String,
    pub valor: String,
    pub horario: DateTime<Utc>,
    #[serde(default)]
    pub pagador: Option<PayerBody>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PayerBody {
    #[serde(default)]
    pub nome: Option<String>,
    #[serde(default)]
    pub cpf: Option<String>,
    #[serde(default)]
    pub cnpj: Option<String>,
}

impl CobvResponseBody {
    /// Converts the wire body into the domain representation. The payload
    /// URL may arrive nested under `loc` or flat, depending on endpoint.
    pub(crate) fn into_psp_charge(self) -> Result<PspCharge, PspError> {
        let location = self
            .loc
            .and_then(|l| l.location)
            .or(self.location)
            .map(|l| l.trim().to_owned())
            .filter(|l| !l.is_empty());

        // The most recent payment event carries the settlement.
        let settlement = self
            .pix
            .into_iter()
            .next_back()
            .map(|event| {
                let amount = Decimal::from_str(event.valor.trim()).map_err(|e| {
                    PspError::Protocol {
                        status: 200,
                        body: format!("unparseable settlement amount {:?}: {e}", event.valor),
                    }
                })?;
                let payer = event.pagador.map_or(
                    Payer {
                        name: None,
                        document: None,
                    },
                    |p| Payer {
                        name: p.nome,
                        document: p.cpf.or(p.cnpj),
                    },
                );
                Ok::<_, PspError>(Settlement {
                    end_to_end_id: event.end_to_end_id,
                    payer,
                    amount,
                    paid_at: event.horario,
                })
            })
            .transpose()?;

        Ok(PspCharge {
            txid: self.txid,
            status: self.status,
            revision: self.revision,
            location,
            payable_text: self
                .pix_copia_e_cola
                .map(|p| p.trim().to_owned())
                .filter(|p| !p.is_empty()),
            settlement,
        })
    }
}
